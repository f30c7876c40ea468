//! The type conversion registry.
//!
//! Each supported native type implements:
//! - [`ToRuntime`]: native value → runtime [`Value`]
//! - [`FromRuntime`]: runtime value → native value, with a default for
//!   missing arguments via [`FromRuntime::from_runtime_or`]
//!
//! Dispatch is static: supporting a new type means implementing the traits
//! for it. Bound classes get their implementations from the `native_class!`
//! macro in the `scriptbind` crate.
//!
//! ## Supported Types
//!
//! - Integers: `i8`..`i64`, `u8`..`u64`, `isize`, `usize` (range checked;
//!   integral floats are accepted)
//! - Floats: `f32`, `f64` (integers widen)
//! - `bool`, `String`, `&str` (to runtime only), `char`
//! - `Vec<T>` ↔ array, `Option<T>` ↔ null/undefined
//! - `Value` (pass-through), `()` (undefined)
//! - [`Shared<T>`], [`Alias<T>`] for bound classes
//! - `Result<T, E: Display>` (to runtime only; `Err` becomes a script error)

use std::fmt::Display;

use crate::error::{BindError, ConversionError};
use crate::object::{self, Alias, Shared};
use crate::runtime::Runtime;
use crate::value::Value;

/// Convert a native value into a runtime value.
pub trait ToRuntime {
    fn to_runtime(self, rt: &mut Runtime) -> Result<Value, BindError>;
}

/// Convert a runtime value into a native value.
pub trait FromRuntime: Sized {
    fn from_runtime(value: &Value, rt: &Runtime) -> Result<Self, BindError>;

    /// `default` when the value is missing or `undefined`; any other
    /// incompatible value still fails.
    fn from_runtime_or(value: Option<&Value>, default: Self, rt: &Runtime) -> Result<Self, BindError> {
        match value {
            None | Some(Value::Undefined) => Ok(default),
            Some(v) => Self::from_runtime(v, rt),
        }
    }
}

fn mismatch(expected: &'static str, actual: &Value) -> BindError {
    BindError::Conversion(ConversionError::TypeMismatch {
        expected,
        actual: actual.type_name(),
    })
}

// ============================================================================
// Integer implementations
// ============================================================================

fn integral(value: &Value, target_type: &'static str) -> Result<i128, BindError> {
    match value {
        Value::Int(v) => Ok(*v as i128),
        Value::Float(f) if f.fract() == 0.0 && f.abs() < 1e38 => Ok(*f as i128),
        Value::Float(f) => Err(BindError::Conversion(ConversionError::NotAnInteger {
            value: *f,
            target_type,
        })),
        other => Err(mismatch("int", other)),
    }
}

macro_rules! impl_convert_int {
    ($($ty:ty),*) => {
        $(
            impl FromRuntime for $ty {
                fn from_runtime(value: &Value, _rt: &Runtime) -> Result<Self, BindError> {
                    let wide = integral(value, stringify!($ty))?;
                    <$ty>::try_from(wide).map_err(|_| {
                        BindError::Conversion(ConversionError::IntegerOverflow {
                            value: wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64,
                            target_type: stringify!($ty),
                        })
                    })
                }
            }

            impl ToRuntime for $ty {
                fn to_runtime(self, _rt: &mut Runtime) -> Result<Value, BindError> {
                    Ok(Value::Int(self as i64))
                }
            }
        )*
    };
}

impl_convert_int!(i8, i16, i32, i64, isize, u8, u16, u32);

// Values above i64::MAX do not fit the runtime's integer; they become floats.
macro_rules! impl_convert_wide_uint {
    ($($ty:ty),*) => {
        $(
            impl FromRuntime for $ty {
                fn from_runtime(value: &Value, _rt: &Runtime) -> Result<Self, BindError> {
                    let wide = integral(value, stringify!($ty))?;
                    <$ty>::try_from(wide).map_err(|_| {
                        BindError::Conversion(ConversionError::IntegerOverflow {
                            value: wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64,
                            target_type: stringify!($ty),
                        })
                    })
                }
            }

            impl ToRuntime for $ty {
                fn to_runtime(self, _rt: &mut Runtime) -> Result<Value, BindError> {
                    Ok(match i64::try_from(self) {
                        Ok(v) => Value::Int(v),
                        Err(_) => Value::Float(self as f64),
                    })
                }
            }
        )*
    };
}

impl_convert_wide_uint!(u64, usize);

// ============================================================================
// Float implementations
// ============================================================================

macro_rules! impl_convert_float {
    ($($ty:ty),*) => {
        $(
            impl FromRuntime for $ty {
                fn from_runtime(value: &Value, _rt: &Runtime) -> Result<Self, BindError> {
                    value
                        .as_float()
                        .map(|f| f as $ty)
                        .ok_or_else(|| mismatch("float", value))
                }
            }

            impl ToRuntime for $ty {
                fn to_runtime(self, _rt: &mut Runtime) -> Result<Value, BindError> {
                    Ok(Value::Float(self as f64))
                }
            }
        )*
    };
}

impl_convert_float!(f32, f64);

// ============================================================================
// Scalars and strings
// ============================================================================

impl FromRuntime for bool {
    fn from_runtime(value: &Value, _rt: &Runtime) -> Result<Self, BindError> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl ToRuntime for bool {
    fn to_runtime(self, _rt: &mut Runtime) -> Result<Value, BindError> {
        Ok(Value::Bool(self))
    }
}

impl FromRuntime for String {
    fn from_runtime(value: &Value, _rt: &Runtime) -> Result<Self, BindError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("string", value))
    }
}

impl ToRuntime for String {
    fn to_runtime(self, _rt: &mut Runtime) -> Result<Value, BindError> {
        Ok(Value::String(self))
    }
}

impl ToRuntime for &str {
    fn to_runtime(self, _rt: &mut Runtime) -> Result<Value, BindError> {
        Ok(Value::String(self.to_string()))
    }
}

/// Single-character strings.
impl FromRuntime for char {
    fn from_runtime(value: &Value, _rt: &Runtime) -> Result<Self, BindError> {
        let text = value.as_str().ok_or_else(|| mismatch("char", value))?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(mismatch("char", value)),
        }
    }
}

impl ToRuntime for char {
    fn to_runtime(self, _rt: &mut Runtime) -> Result<Value, BindError> {
        Ok(Value::String(self.to_string()))
    }
}

impl FromRuntime for Value {
    fn from_runtime(value: &Value, _rt: &Runtime) -> Result<Self, BindError> {
        Ok(value.clone())
    }
}

impl ToRuntime for Value {
    fn to_runtime(self, _rt: &mut Runtime) -> Result<Value, BindError> {
        Ok(self)
    }
}

impl ToRuntime for () {
    fn to_runtime(self, _rt: &mut Runtime) -> Result<Value, BindError> {
        Ok(Value::Undefined)
    }
}

// ============================================================================
// Containers
// ============================================================================

impl<T: FromRuntime> FromRuntime for Vec<T> {
    fn from_runtime(value: &Value, rt: &Runtime) -> Result<Self, BindError> {
        let items = value.as_array().ok_or_else(|| mismatch("array", value))?;
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                T::from_runtime(item, rt).map_err(|err| match err {
                    BindError::Conversion(source) => BindError::Conversion(ConversionError::Element {
                        index,
                        source: Box::new(source),
                    }),
                    other => other,
                })
            })
            .collect()
    }
}

impl<T: ToRuntime> ToRuntime for Vec<T> {
    fn to_runtime(self, rt: &mut Runtime) -> Result<Value, BindError> {
        self.into_iter()
            .map(|item| item.to_runtime(rt))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

impl<T: FromRuntime> FromRuntime for Option<T> {
    fn from_runtime(value: &Value, rt: &Runtime) -> Result<Self, BindError> {
        if value.is_nullish() {
            Ok(None)
        } else {
            T::from_runtime(value, rt).map(Some)
        }
    }
}

impl<T: ToRuntime> ToRuntime for Option<T> {
    fn to_runtime(self, rt: &mut Runtime) -> Result<Value, BindError> {
        match self {
            Some(v) => v.to_runtime(rt),
            None => Ok(Value::Null),
        }
    }
}

impl<T: ToRuntime, E: Display> ToRuntime for Result<T, E> {
    fn to_runtime(self, rt: &mut Runtime) -> Result<Value, BindError> {
        match self {
            Ok(v) => v.to_runtime(rt),
            Err(err) => Err(BindError::native(err.to_string())),
        }
    }
}

// ============================================================================
// Native objects
// ============================================================================

impl<T: 'static> ToRuntime for Shared<T> {
    fn to_runtime(self, rt: &mut Runtime) -> Result<Value, BindError> {
        object::wrap_shared(rt, self)
    }
}

impl<T: 'static> FromRuntime for Shared<T> {
    fn from_runtime(value: &Value, rt: &Runtime) -> Result<Self, BindError> {
        object::shared_of(rt, value)
    }
}

impl<T: 'static> ToRuntime for Alias<T> {
    fn to_runtime(self, rt: &mut Runtime) -> Result<Value, BindError> {
        object::wrap_alias(rt, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn back<T: FromRuntime + ToRuntime>(value: T) -> T {
        let mut rt = Runtime::new();
        let v = value.to_runtime(&mut rt).unwrap();
        T::from_runtime(&v, &rt).unwrap()
    }

    #[test]
    fn round_trips() {
        assert_eq!(back(-5i32), -5);
        assert_eq!(back(1u64 << 63), 1u64 << 63);
        assert_eq!(back(1.5f64), 1.5);
        assert!(back(true));
        assert_eq!(back(String::from("hi")), "hi");
        assert_eq!(back('x'), 'x');
        assert_eq!(back(vec![1u8, 2, 3]), vec![1, 2, 3]);
        assert_eq!(back(Some(4i64)), Some(4));
        assert_eq!(back(None::<i64>), None);
    }

    #[test]
    fn int_overflow_is_reported() {
        let rt = Runtime::new();
        let err = u8::from_runtime(&Value::Int(300), &rt).unwrap_err();
        assert_eq!(
            err,
            BindError::Conversion(ConversionError::IntegerOverflow {
                value: 300,
                target_type: "u8"
            })
        );
        assert!(u32::from_runtime(&Value::Int(-1), &rt).is_err());
    }

    #[test]
    fn integral_floats_are_ints() {
        let rt = Runtime::new();
        assert_eq!(i32::from_runtime(&Value::Float(4.0), &rt).unwrap(), 4);
        assert!(matches!(
            i32::from_runtime(&Value::Float(4.5), &rt),
            Err(BindError::Conversion(ConversionError::NotAnInteger { .. }))
        ));
    }

    #[test]
    fn ints_widen_to_floats() {
        let rt = Runtime::new();
        assert_eq!(f64::from_runtime(&Value::Int(3), &rt).unwrap(), 3.0);
    }

    #[test]
    fn kind_mismatch() {
        let rt = Runtime::new();
        let err = bool::from_runtime(&Value::Int(1), &rt).unwrap_err();
        assert_eq!(
            err,
            BindError::Conversion(ConversionError::TypeMismatch {
                expected: "bool",
                actual: "int"
            })
        );
        assert!(String::from_runtime(&Value::Null, &rt).is_err());
    }

    #[test]
    fn default_only_for_missing_or_undefined() {
        let rt = Runtime::new();
        assert_eq!(i32::from_runtime_or(None, 7, &rt).unwrap(), 7);
        assert_eq!(i32::from_runtime_or(Some(&Value::Undefined), 7, &rt).unwrap(), 7);
        assert_eq!(i32::from_runtime_or(Some(&Value::Int(2)), 7, &rt).unwrap(), 2);
        assert!(i32::from_runtime_or(Some(&Value::Null), 7, &rt).is_err());
    }

    #[test]
    fn array_element_errors_carry_index() {
        let rt = Runtime::new();
        let value = Value::Array(vec![Value::Int(1), Value::Bool(false)]);
        let err = Vec::<i32>::from_runtime(&value, &rt).unwrap_err();
        assert!(matches!(
            err,
            BindError::Conversion(ConversionError::Element { index: 1, .. })
        ));
    }

    #[test]
    fn unit_and_results() {
        let mut rt = Runtime::new();
        assert_eq!(().to_runtime(&mut rt).unwrap(), Value::Undefined);
        let ok: Result<i32, String> = Ok(1);
        assert_eq!(ok.to_runtime(&mut rt).unwrap(), Value::Int(1));
        let err: Result<i32, String> = Err("bad".into());
        assert_eq!(err.to_runtime(&mut rt).unwrap_err(), BindError::native("bad"));
    }

    #[test]
    fn unbound_classes_cannot_be_wrapped() {
        struct Nope;
        let mut rt = Runtime::new();
        assert!(matches!(
            Shared::new(Nope).to_runtime(&mut rt),
            Err(BindError::UnboundType { .. })
        ));
    }
}

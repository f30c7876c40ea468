use std::fmt;

use scriptbind_core::{BindError, ConversionError, RegistrationError, Runtime, Value};

use super::param::{NativeParam, ParamInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// A default value written as `numerator / denominator`, evaluated in the
/// parameter's own type (`T(num) / den`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// How one parameter is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgSlot {
    pub direction: Direction,
    pub optional: bool,
    pub default: Option<Rational>,
}

impl ArgSlot {
    pub const fn required() -> Self {
        Self {
            direction: Direction::In,
            optional: false,
            default: None,
        }
    }

    pub const fn optional() -> Self {
        Self {
            direction: Direction::In,
            optional: true,
            default: None,
        }
    }

    pub const fn defaulted(num: i64, den: i64) -> Self {
        Self {
            direction: Direction::In,
            optional: true,
            default: Some(Rational { num, den }),
        }
    }

    pub const fn output() -> Self {
        Self {
            direction: Direction::Out,
            optional: true,
            default: None,
        }
    }

    pub const fn reference() -> Self {
        Self {
            direction: Direction::InOut,
            optional: false,
            default: None,
        }
    }

    pub const fn ref_optional() -> Self {
        Self {
            direction: Direction::InOut,
            optional: true,
            default: None,
        }
    }

    pub const fn ref_defaulted(num: i64, den: i64) -> Self {
        Self {
            direction: Direction::InOut,
            optional: true,
            default: Some(Rational { num, den }),
        }
    }

    /// Out and in-out slots alias the caller's value and are exported.
    pub fn is_exported(&self) -> bool {
        self.direction != Direction::In
    }

    fn role(&self) -> &'static str {
        match self.direction {
            Direction::In => "input",
            Direction::Out => "output",
            Direction::InOut => "reference",
        }
    }

    /// Whether filling this slot can fall back to the parameter's zero value.
    fn needs_zero(&self) -> bool {
        match self.direction {
            Direction::Out => true,
            Direction::InOut => self.default.is_none(),
            Direction::In => self.optional && self.default.is_none(),
        }
    }

    fn fills_when_undefined(&self) -> bool {
        self.optional || self.default.is_some() || self.direction == Direction::InOut
    }
}

/// Slots for every parameter of one callable, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgSpec {
    slots: Vec<ArgSlot>,
}

impl ArgSpec {
    pub fn new(slots: Vec<ArgSlot>) -> Self {
        Self { slots }
    }

    /// `reference` for `Out<T>` parameters, `required` for the rest.
    pub fn infer(params: &[ParamInfo]) -> Self {
        Self::new(
            params
                .iter()
                .map(|p| {
                    if p.is_reference {
                        ArgSlot::reference()
                    } else {
                        ArgSlot::required()
                    }
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[ArgSlot] {
        &self.slots
    }

    /// Slot at `index`; positions past the end are `required`.
    pub fn slot(&self, index: usize) -> ArgSlot {
        self.slots.get(index).copied().unwrap_or(ArgSlot::required())
    }

    pub fn has_exports(&self) -> bool {
        self.slots.iter().any(ArgSlot::is_exported)
    }

    /// Check the argument spec against the callable's parameters.
    pub fn validate(&self, context: &str, params: &[ParamInfo]) -> Result<(), RegistrationError> {
        if params.len() != self.slots.len() {
            return Err(RegistrationError::ArityMismatch {
                context: context.to_string(),
                params: params.len(),
                specs: self.slots.len(),
            });
        }

        for (index, (slot, param)) in self.slots.iter().zip(params).enumerate() {
            if slot.is_exported() && !param.is_reference {
                return Err(RegistrationError::NotMutableReference {
                    context: context.to_string(),
                    index,
                    role: slot.role(),
                });
            }
            if slot.needs_zero() && !param.has_zero {
                return Err(RegistrationError::NoZeroValue {
                    context: context.to_string(),
                    index,
                    type_name: param.type_name,
                });
            }
            if let Some(Rational { num, den }) = slot.default {
                if den == 0 || !(param.accepts_rational)(num, den) {
                    return Err(RegistrationError::InvalidDefault {
                        context: context.to_string(),
                        index,
                        type_name: param.type_name,
                        num,
                        den,
                    });
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<ArgSlot>> for ArgSpec {
    fn from(slots: Vec<ArgSlot>) -> Self {
        Self::new(slots)
    }
}

fn at(index: usize, err: BindError) -> BindError {
    match err {
        BindError::Conversion(source) => BindError::at_argument(index, source),
        other => other,
    }
}

fn missing(index: usize) -> BindError {
    BindError::at_argument(index, ConversionError::MissingArgument)
}

/// Produce the native value for parameter `index` from its runtime argument.
pub fn fill<P: NativeParam>(
    slot: ArgSlot,
    index: usize,
    arg: Option<&Value>,
    rt: &Runtime,
) -> Result<P::Value, BindError> {
    if slot.direction == Direction::Out {
        return P::zero().ok_or_else(|| missing(index));
    }

    match arg {
        Some(value) if !(value.is_undefined() && slot.fills_when_undefined()) => {
            P::extract(value, rt).map_err(|err| at(index, err))
        }
        _ => match slot.default {
            Some(Rational { num, den }) => P::from_rational(num, den).ok_or_else(|| missing(index)),
            None if slot.optional || slot.direction == Direction::InOut => {
                P::zero().ok_or_else(|| missing(index))
            }
            None => Err(missing(index)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Out;

    fn info<P: NativeParam>() -> ParamInfo {
        ParamInfo::of::<P>()
    }

    fn fill_i32(slot: ArgSlot, arg: Option<Value>) -> Result<i32, BindError> {
        let rt = Runtime::new();
        fill::<i32>(slot, 0, arg.as_ref(), &rt)
    }

    #[test]
    fn required_needs_an_argument() {
        assert_eq!(fill_i32(ArgSlot::required(), Some(Value::Int(4))).unwrap(), 4);
        assert_eq!(
            fill_i32(ArgSlot::required(), None).unwrap_err(),
            BindError::at_argument(0, ConversionError::MissingArgument)
        );
        assert!(matches!(
            fill_i32(ArgSlot::required(), Some(Value::Bool(true))),
            Err(BindError::Argument { index: 0, .. })
        ));
    }

    #[test]
    fn optional_defaults_to_zero() {
        assert_eq!(fill_i32(ArgSlot::optional(), None).unwrap(), 0);
        assert_eq!(fill_i32(ArgSlot::optional(), Some(Value::Undefined)).unwrap(), 0);
        assert_eq!(fill_i32(ArgSlot::optional(), Some(Value::Int(9))).unwrap(), 9);
    }

    #[test]
    fn defaulted_uses_rational() {
        assert_eq!(fill_i32(ArgSlot::defaulted(7, 2), None).unwrap(), 3);
        assert_eq!(fill_i32(ArgSlot::defaulted(7, 2), Some(Value::Int(1))).unwrap(), 1);
        let rt = Runtime::new();
        let half = fill::<f64>(ArgSlot::defaulted(1, 2), 0, None, &rt).unwrap();
        assert_eq!(half, 0.5);
    }

    #[test]
    fn output_ignores_the_argument() {
        assert_eq!(fill_i32(ArgSlot::output(), Some(Value::Int(99))).unwrap(), 0);
        assert_eq!(fill_i32(ArgSlot::output(), None).unwrap(), 0);
    }

    #[test]
    fn reference_seeds_from_argument() {
        assert_eq!(fill_i32(ArgSlot::reference(), Some(Value::Int(5))).unwrap(), 5);
        assert_eq!(fill_i32(ArgSlot::reference(), None).unwrap(), 0);
        assert_eq!(fill_i32(ArgSlot::ref_optional(), None).unwrap(), 0);
        assert_eq!(fill_i32(ArgSlot::ref_defaulted(3, 1), None).unwrap(), 3);
        assert_eq!(fill_i32(ArgSlot::ref_defaulted(3, 1), Some(Value::Int(8))).unwrap(), 8);
    }

    #[test]
    fn validate_arity() {
        let spec = ArgSpec::new(vec![ArgSlot::required()]);
        let err = spec.validate("f", &[info::<i32>(), info::<i32>()]).unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::ArityMismatch {
                params: 2,
                specs: 1,
                ..
            }
        ));
    }

    #[test]
    fn validate_output_needs_reference() {
        let spec = ArgSpec::new(vec![ArgSlot::output()]);
        assert!(matches!(
            spec.validate("f", &[info::<i32>()]),
            Err(RegistrationError::NotMutableReference { index: 0, .. })
        ));
        assert!(spec.validate("f", &[info::<Out<i32>>()]).is_ok());
    }

    #[test]
    fn validate_defaults() {
        let spec = ArgSpec::new(vec![ArgSlot::defaulted(1, 0)]);
        assert!(matches!(
            spec.validate("f", &[info::<i32>()]),
            Err(RegistrationError::InvalidDefault { .. })
        ));
        let spec = ArgSpec::new(vec![ArgSlot::defaulted(1, 1)]);
        assert!(matches!(
            spec.validate("f", &[info::<String>()]),
            Err(RegistrationError::InvalidDefault { .. })
        ));
        let spec = ArgSpec::new(vec![ArgSlot::defaulted(300, 1)]);
        assert!(spec.validate("f", &[info::<u8>()]).is_err());
    }

    #[test]
    fn validate_zero_values() {
        let spec = ArgSpec::new(vec![ArgSlot::optional()]);
        assert!(matches!(
            spec.validate("f", &[info::<scriptbind_core::ObjRef<u8>>()]),
            Err(RegistrationError::NoZeroValue { .. })
        ));
    }

    #[test]
    fn infer_marks_out_params_as_references() {
        let spec = ArgSpec::infer(&[info::<i32>(), info::<Out<bool>>()]);
        assert_eq!(spec.slots(), &[ArgSlot::required(), ArgSlot::reference()]);
        assert!(spec.has_exports());
    }

    #[test]
    fn slot_past_end_is_required() {
        assert_eq!(ArgSpec::default().slot(3), ArgSlot::required());
    }

    #[test]
    fn args_macro() {
        let spec = crate::args![required, ref_defaulted(1, 2), output];
        assert_eq!(
            spec.slots(),
            &[
                ArgSlot::required(),
                ArgSlot::ref_defaulted(1, 2),
                ArgSlot::output()
            ]
        );
    }
}

//! Native parameter types.

use std::any::type_name;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use scriptbind_core::{BindError, FromRuntime, ObjMut, ObjRef, Runtime, Shared, ToRuntime, Value};

/// Deferred conversion of an output parameter back into a runtime value,
/// run after the native call returns.
pub type Export = Box<dyn FnOnce(&mut Runtime) -> Result<Value, BindError>>;

/// A type that can appear as a parameter of a bound function.
///
/// Filling a parameter happens in two steps so that every argument is
/// converted before any native code runs: [`extract`](Self::extract) (or a
/// slot fallback) yields the intermediate `Value`, then
/// [`prepare`](Self::prepare) turns it into the parameter itself plus, for
/// output parameters, the export that reads it back.
pub trait NativeParam: Sized + 'static {
    type Value: 'static;

    /// Whether the parameter can be used with output and reference slots.
    const IS_REFERENCE: bool = false;

    fn extract(value: &Value, rt: &Runtime) -> Result<Self::Value, BindError>;

    /// Value for optional and output slots with no argument.
    fn zero() -> Option<Self::Value> {
        None
    }

    /// `T(num) / den`, if the type can represent it.
    fn from_rational(_num: i64, _den: i64) -> Option<Self::Value> {
        None
    }

    fn prepare(value: Self::Value) -> (Self, Option<Export>);
}

/// Static facts about a parameter, used to validate argument specs at
/// registration time.
#[derive(Debug, Clone, Copy)]
pub struct ParamInfo {
    pub type_name: &'static str,
    pub is_reference: bool,
    pub has_zero: bool,
    pub accepts_rational: fn(i64, i64) -> bool,
}

fn accepts_rational<P: NativeParam>(num: i64, den: i64) -> bool {
    P::from_rational(num, den).is_some()
}

impl ParamInfo {
    pub fn of<P: NativeParam>() -> Self {
        Self {
            type_name: type_name::<P>(),
            is_reference: P::IS_REFERENCE,
            has_zero: P::zero().is_some(),
            accepts_rational: accepts_rational::<P>,
        }
    }
}

// ============================================================================
// Scalars
// ============================================================================

macro_rules! impl_param_int {
    ($($ty:ty),*) => {
        $(
            impl NativeParam for $ty {
                type Value = $ty;

                fn extract(value: &Value, rt: &Runtime) -> Result<$ty, BindError> {
                    <$ty as FromRuntime>::from_runtime(value, rt)
                }

                fn zero() -> Option<$ty> {
                    Some(0)
                }

                fn from_rational(num: i64, den: i64) -> Option<$ty> {
                    let num = <$ty>::try_from(num).ok()?;
                    let den = <$ty>::try_from(den).ok()?;
                    num.checked_div(den)
                }

                fn prepare(value: $ty) -> ($ty, Option<Export>) {
                    (value, None)
                }
            }
        )*
    };
}

impl_param_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_param_float {
    ($($ty:ty),*) => {
        $(
            impl NativeParam for $ty {
                type Value = $ty;

                fn extract(value: &Value, rt: &Runtime) -> Result<$ty, BindError> {
                    <$ty as FromRuntime>::from_runtime(value, rt)
                }

                fn zero() -> Option<$ty> {
                    Some(0.0)
                }

                fn from_rational(num: i64, den: i64) -> Option<$ty> {
                    (den != 0).then(|| num as $ty / den as $ty)
                }

                fn prepare(value: $ty) -> ($ty, Option<Export>) {
                    (value, None)
                }
            }
        )*
    };
}

impl_param_float!(f32, f64);

/// Parameters with a zero value and no rational defaults.
macro_rules! impl_param_plain {
    ($($ty:ty => $zero:expr),* $(,)?) => {
        $(
            impl NativeParam for $ty {
                type Value = $ty;

                fn extract(value: &Value, rt: &Runtime) -> Result<$ty, BindError> {
                    <$ty as FromRuntime>::from_runtime(value, rt)
                }

                fn zero() -> Option<$ty> {
                    Some($zero)
                }

                fn prepare(value: $ty) -> ($ty, Option<Export>) {
                    (value, None)
                }
            }
        )*
    };
}

impl_param_plain!(
    String => String::new(),
    char => '\0',
    Value => Value::Undefined,
);

impl NativeParam for bool {
    type Value = bool;

    fn extract(value: &Value, rt: &Runtime) -> Result<bool, BindError> {
        <bool as FromRuntime>::from_runtime(value, rt)
    }

    fn zero() -> Option<bool> {
        Some(false)
    }

    fn from_rational(num: i64, den: i64) -> Option<bool> {
        (den != 0).then_some(num != 0)
    }

    fn prepare(value: bool) -> (bool, Option<Export>) {
        (value, None)
    }
}

// ============================================================================
// Containers and objects
// ============================================================================

impl<T: FromRuntime + 'static> NativeParam for Vec<T> {
    type Value = Vec<T>;

    fn extract(value: &Value, rt: &Runtime) -> Result<Vec<T>, BindError> {
        <Vec<T> as FromRuntime>::from_runtime(value, rt)
    }

    fn zero() -> Option<Vec<T>> {
        Some(Vec::new())
    }

    fn prepare(value: Vec<T>) -> (Vec<T>, Option<Export>) {
        (value, None)
    }
}

impl<T: FromRuntime + 'static> NativeParam for Option<T> {
    type Value = Option<T>;

    fn extract(value: &Value, rt: &Runtime) -> Result<Option<T>, BindError> {
        <Option<T> as FromRuntime>::from_runtime(value, rt)
    }

    fn zero() -> Option<Option<T>> {
        Some(None)
    }

    fn prepare(value: Option<T>) -> (Option<T>, Option<Export>) {
        (value, None)
    }
}

impl<T: 'static> NativeParam for Shared<T> {
    type Value = Shared<T>;

    fn extract(value: &Value, rt: &Runtime) -> Result<Shared<T>, BindError> {
        <Shared<T> as FromRuntime>::from_runtime(value, rt)
    }

    fn prepare(value: Shared<T>) -> (Shared<T>, Option<Export>) {
        (value, None)
    }
}

/// Borrows the wrapped object (or the `T` inside a derived object) for the
/// duration of the call.
impl<T: 'static> NativeParam for ObjRef<T> {
    type Value = ObjRef<T>;

    fn extract(value: &Value, rt: &Runtime) -> Result<ObjRef<T>, BindError> {
        ObjRef::from_value(rt, value)
    }

    fn prepare(value: ObjRef<T>) -> (ObjRef<T>, Option<Export>) {
        (value, None)
    }
}

impl<T: 'static> NativeParam for ObjMut<T> {
    type Value = ObjMut<T>;

    fn extract(value: &Value, rt: &Runtime) -> Result<ObjMut<T>, BindError> {
        ObjMut::from_value(rt, value)
    }

    fn prepare(value: ObjMut<T>) -> (ObjMut<T>, Option<Export>) {
        (value, None)
    }
}

// ============================================================================
// Output parameters
// ============================================================================

/// A mutable parameter whose final value is exported back to the caller
/// when its slot is `output` or a `reference` variant.
///
/// Cloning shares the cell.
pub struct Out<T>(Rc<RefCell<T>>);

impl<T> Out<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }

    pub fn replace(&self, value: T) -> T {
        self.0.replace(value)
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.0.borrow_mut());
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }
}

impl<T> Clone for Out<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Out<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Out").field(&*self.0.borrow()).finish()
    }
}

impl<T> NativeParam for Out<T>
where
    T: NativeParam<Value = T> + ToRuntime + Clone,
{
    type Value = T;

    const IS_REFERENCE: bool = true;

    fn extract(value: &Value, rt: &Runtime) -> Result<T, BindError> {
        T::extract(value, rt)
    }

    fn zero() -> Option<T> {
        T::zero()
    }

    fn from_rational(num: i64, den: i64) -> Option<T> {
        T::from_rational(num, den)
    }

    fn prepare(value: T) -> (Self, Option<Export>) {
        let out = Out::new(value);
        let cell = out.0.clone();
        let export: Export = Box::new(move |rt: &mut Runtime| {
            // Native code may keep a clone of the parameter; export a copy then.
            let value = match Rc::try_unwrap(cell) {
                Ok(cell) => cell.into_inner(),
                Err(shared) => shared
                    .try_borrow()
                    .map_err(|_| BindError::native("output parameter is still mutably borrowed"))?
                    .clone(),
            };
            value.to_runtime(rt)
        });
        (out, Some(export))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_rationals_divide_in_the_target_type() {
        assert_eq!(i32::from_rational(7, 2), Some(3));
        assert_eq!(i32::from_rational(-7, 2), Some(-3));
        assert_eq!(u8::from_rational(300, 1), None);
        assert_eq!(u32::from_rational(-1, 1), None);
        assert_eq!(i64::from_rational(1, 0), None);
    }

    #[test]
    fn float_rationals() {
        assert_eq!(f64::from_rational(1, 4), Some(0.25));
        assert_eq!(f32::from_rational(1, 0), None);
    }

    #[test]
    fn param_info() {
        let info = ParamInfo::of::<Out<i32>>();
        assert!(info.is_reference);
        assert!(info.has_zero);
        assert!((info.accepts_rational)(1, 2));

        let info = ParamInfo::of::<String>();
        assert!(!info.is_reference);
        assert!(!(info.accepts_rational)(1, 1));

        assert!(!ParamInfo::of::<Shared<u8>>().has_zero);
    }

    #[test]
    fn out_exports_its_final_value() {
        let mut rt = Runtime::new();
        let (out, export) = Out::<i32>::prepare(4);
        out.update(|v| *v *= 10);
        drop(out);
        let export = export.expect("out parameters export");
        assert_eq!(export(&mut rt).unwrap(), Value::Int(40));
    }

    #[test]
    fn retained_out_exports_a_copy() {
        let mut rt = Runtime::new();
        let (out, export) = Out::<i32>::prepare(1);
        let kept = out.clone();
        out.set(5);
        drop(out);
        assert_eq!(export.unwrap()(&mut rt).unwrap(), Value::Int(5));
        kept.set(6);
        assert_eq!(kept.get(), 6);
    }
}

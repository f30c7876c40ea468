//! Argument slots.
//!
//! Each native parameter gets an [`ArgSlot`] describing how the runtime
//! argument at its position becomes a native value:
//!
//! | slot                 | direction | missing argument       | exported |
//! |----------------------|-----------|------------------------|----------|
//! | `required`           | in        | error                  | no       |
//! | `optional`           | in        | zero value             | no       |
//! | `defaulted(n, d)`    | in        | `T(n) / d`             | no       |
//! | `output`             | out       | zero (argument ignored)| yes      |
//! | `reference`          | inout     | zero value             | yes      |
//! | `ref_optional`       | inout     | zero value             | yes      |
//! | `ref_defaulted(n, d)`| inout     | `T(n) / d`             | yes      |
//!
//! Output and reference slots require an [`Out<T>`] parameter. When a call
//! has exported slots its result is an array: the return value (omitted for
//! `()`), then each exported value in parameter order.

mod param;
mod slot;

pub use param::{Export, NativeParam, Out, ParamInfo};
pub use slot::{ArgSlot, ArgSpec, Direction, Rational, fill};

/// Build an [`ArgSpec`] from slot constructors.
///
/// ```
/// use scriptbind::{args, ArgSlot};
///
/// let spec = args![required, defaulted(0, 1), output];
/// assert_eq!(spec.len(), 3);
/// assert_eq!(spec.slot(1), ArgSlot::defaulted(0, 1));
/// ```
#[macro_export]
macro_rules! args {
    ($($kind:ident $(( $($arg:expr),* ))?),* $(,)?) => {
        $crate::args::ArgSpec::new(vec![
            $($crate::args::ArgSlot::$kind($($($arg),*)?)),*
        ])
    };
}

//! Per-arity dispatch.
//!
//! A native callable is any `Fn` of up to eight [`NativeParam`]s. The traits
//! here are implemented for every such closure shape by `macro_rules!`, with
//! a marker type parameter standing in for the signature so that the shapes
//! do not overlap:
//!
//! - [`NativeFunction`]: `Fn(P0, .., Pn) -> R`
//! - [`NativeMethod`]: `Fn(&S, P0, ..) -> R` and `Fn(&mut S, P0, ..) -> R`
//! - [`NativeConstructor`]: `Fn(P0, ..) -> T`
//!
//! Every argument is filled before native code runs, so a conversion failure
//! never leaves a call half done.

use std::any::TypeId;

use scriptbind_core::{BindError, Runtime, ToRuntime, Value};

use crate::args::{ArgSlot, Export, NativeParam};

/// Expand `$m!` once per supported arity.
macro_rules! all_arities {
    ($m:ident) => {
        $m!();
        $m!(P0 p0 0);
        $m!(P0 p0 0, P1 p1 1);
        $m!(P0 p0 0, P1 p1 1, P2 p2 2);
        $m!(P0 p0 0, P1 p1 1, P2 p2 2, P3 p3 3);
        $m!(P0 p0 0, P1 p1 1, P2 p2 2, P3 p3 3, P4 p4 4);
        $m!(P0 p0 0, P1 p1 1, P2 p2 2, P3 p3 3, P4 p4 4, P5 p5 5);
        $m!(P0 p0 0, P1 p1 1, P2 p2 2, P3 p3 3, P4 p4 4, P5 p5 5, P6 p6 6);
        $m!(P0 p0 0, P1 p1 1, P2 p2 2, P3 p3 3, P4 p4 4, P5 p5 5, P6 p6 6, P7 p7 7);
    };
}

mod constructor;
mod function;
mod method;

pub use constructor::NativeConstructor;
pub use function::NativeFunction;
pub use method::NativeMethod;

pub(crate) fn returns_unit<R: 'static>() -> bool {
    TypeId::of::<R>() == TypeId::of::<()>()
}

/// Turn a filled value into the parameter, collecting its export when the
/// slot is an output or reference slot.
pub(crate) fn prepare<P: NativeParam>(slot: ArgSlot, value: P::Value, exports: &mut Vec<Export>) -> P {
    let (param, export) = P::prepare(value);
    if slot.is_exported() {
        exports.extend(export);
    }
    param
}

/// Convert a native result. With exported slots the result is an array of
/// the return value (omitted for `()`) followed by the exports in parameter
/// order.
pub(crate) fn finish<R: ToRuntime + 'static>(
    rt: &mut Runtime,
    result: R,
    exports: Vec<Export>,
) -> Result<Value, BindError> {
    let value = result.to_runtime(rt)?;
    if exports.is_empty() {
        return Ok(value);
    }

    let mut items = Vec::with_capacity(exports.len() + 1);
    if !returns_unit::<R>() {
        items.push(value);
    }
    for export in exports {
        items.push(export(rt)?);
    }
    Ok(Value::Array(items))
}

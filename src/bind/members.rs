//! Call handlers behind installed members.
//!
//! Each function here wraps a native callable, accessor or cell in a
//! [`NativeFn`] the runtime can call. Handlers convert [`BindError`]s into
//! script errors and log each dispatch at `trace` level.

use std::any::Any;
use std::rc::Rc;

use scriptbind_core::{
    Alias, BindError, CallContext, NativeFn, ObjMut, ObjRef, RegistrationError, Runtime,
    ScriptError, Shared, ToRuntime, Value,
};
use tracing::trace;

use super::field::Field;
use crate::args::{ArgSlot, ArgSpec, NativeParam, ParamInfo, fill};
use crate::invoke::{NativeFunction, NativeMethod};

fn dispatch(
    context: String,
    run: impl Fn(&mut Runtime, &CallContext) -> Result<Value, BindError> + 'static,
) -> NativeFn {
    NativeFn::new(context.clone(), move |rt, ctx| {
        #[cfg(feature = "profiling")]
        profiling::scope!("scriptbind::dispatch", context.as_str());

        trace!(member = %context, args = ctx.arg_count(), "dispatch");
        run(rt, ctx).map_err(ScriptError::from)
    })
}

/// The value assigned by a setter call.
fn assigned<V: NativeParam>(rt: &Runtime, ctx: &CallContext) -> Result<V::Value, BindError> {
    fill::<V>(ArgSlot::required(), 0, ctx.arg(0), rt)
}

// ============================================================================
// Functions
// ============================================================================

pub(crate) fn function<M, F: NativeFunction<M>>(context: String, spec: ArgSpec, f: F) -> NativeFn {
    dispatch(context, move |rt, ctx| f.invoke(rt, &spec, ctx.args()))
}

pub(crate) fn method<M, F: NativeMethod<M>>(context: String, spec: ArgSpec, f: F) -> NativeFn {
    dispatch(context, move |rt, ctx| f.invoke(rt, ctx.this(), &spec, ctx.args()))
}

/// Validate an explicit argument spec against a function's parameters.
pub(crate) fn check_function<M, F: NativeFunction<M>>(
    context: &str,
    spec: &ArgSpec,
) -> Result<(), RegistrationError> {
    spec.validate(context, &F::params())
}

// ============================================================================
// Properties
// ============================================================================

fn check_getter(context: &str, params: usize, returns_unit: bool) -> Result<(), RegistrationError> {
    if params != 0 {
        return Err(RegistrationError::ArityMismatch {
            context: context.to_string(),
            params,
            specs: 0,
        });
    }
    if returns_unit {
        return Err(RegistrationError::VoidGetter {
            context: context.to_string(),
        });
    }
    Ok(())
}

fn setter_spec(context: &str, params: &[ParamInfo]) -> Result<ArgSpec, RegistrationError> {
    let spec = ArgSpec::new(vec![ArgSlot::required()]);
    spec.validate(context, params)?;
    Ok(spec)
}

/// Getter and optional setter built from free functions.
pub(crate) fn static_property<GM, G, SM, S>(
    context: String,
    get: G,
    set: Option<S>,
) -> Result<(NativeFn, Option<NativeFn>), RegistrationError>
where
    G: NativeFunction<GM>,
    S: NativeFunction<SM>,
{
    check_getter(&context, G::params().len(), G::returns_unit())?;
    let getter = function(context.clone(), ArgSpec::default(), get);
    let setter = match set {
        Some(set) => {
            let spec = setter_spec(&context, &S::params())?;
            Some(function(context, spec, set))
        }
        None => None,
    };
    Ok((getter, setter))
}

/// Getter and optional setter built from methods.
pub(crate) fn instance_property<GM, G, SM, S>(
    context: String,
    get: G,
    set: Option<S>,
) -> Result<(NativeFn, Option<NativeFn>), RegistrationError>
where
    G: NativeMethod<GM>,
    S: NativeMethod<SM>,
{
    check_getter(&context, G::params().len(), G::returns_unit())?;
    let getter = method(context.clone(), ArgSpec::default(), get);
    let setter = match set {
        Some(set) => {
            let spec = setter_spec(&context, &S::params())?;
            Some(method(context, spec, set))
        }
        None => None,
    };
    Ok((getter, setter))
}

// ============================================================================
// Variables
// ============================================================================

/// Accessors reading and writing a copy of a native cell.
pub(crate) fn variable<V>(context: String, cell: Shared<V>, writable: bool) -> (NativeFn, Option<NativeFn>)
where
    V: Clone + ToRuntime + NativeParam<Value = V>,
{
    let setter = writable.then(|| cell_setter(context.clone(), cell.clone()));
    let getter = dispatch(context, move |rt, _ctx| {
        let value = (*cell.try_borrow()?).clone();
        value.to_runtime(rt)
    });
    (getter, setter)
}

/// Accessors aliasing a native cell: each read wraps the cell itself, so
/// changes through the wrapper are seen by native code.
pub(crate) fn variable_ref<V>(context: String, cell: Shared<V>, writable: bool) -> (NativeFn, Option<NativeFn>)
where
    V: NativeParam<Value = V>,
{
    let setter = writable.then(|| cell_setter(context.clone(), cell.clone()));
    let getter = dispatch(context, move |rt, _ctx| Alias::of_shared(&cell).to_runtime(rt));
    (getter, setter)
}

fn cell_setter<V: NativeParam<Value = V>>(context: String, cell: Shared<V>) -> NativeFn {
    dispatch(context, move |rt, ctx| {
        let value = assigned::<V>(rt, ctx)?;
        *cell.try_borrow_mut()? = value;
        Ok(Value::Undefined)
    })
}

// ============================================================================
// Instance fields
// ============================================================================

/// Accessors reading and writing a copy of a field of the receiver.
pub(crate) fn field<B, V>(context: String, field: Field<B, V>, writable: bool) -> (NativeFn, Option<NativeFn>)
where
    B: 'static,
    V: Clone + ToRuntime + NativeParam<Value = V>,
{
    let setter = writable.then(|| field_setter(context.clone(), field));
    let getter = dispatch(context, move |rt, ctx| {
        let value = field.get(&*ObjRef::<B>::from_value(rt, ctx.this())?).clone();
        value.to_runtime(rt)
    });
    (getter, setter)
}

/// Accessors aliasing a field of the receiver. The wrapper returned by a
/// read keeps the receiver's native object alive and shares its borrow flag.
pub(crate) fn field_ref<B, V>(context: String, field: Field<B, V>, writable: bool) -> (NativeFn, Option<NativeFn>)
where
    B: 'static,
    V: NativeParam<Value = V>,
{
    let setter = writable.then(|| field_setter(context.clone(), field));
    let getter = dispatch(context, move |rt, ctx| {
        let object = ObjRef::<B>::from_value(rt, ctx.this())?;
        let ptr = field.project(object.as_ptr());
        let owner: Rc<dyn Any> = object.native().clone();
        let flag = object.native().borrow_flag().clone();
        drop(object);
        // SAFETY: `owner` keeps the storage holding the field alive.
        let alias = unsafe { Alias::with_owner(ptr, owner, flag) };
        alias.to_runtime(rt)
    });
    (getter, setter)
}

fn field_setter<B, V>(context: String, field: Field<B, V>) -> NativeFn
where
    B: 'static,
    V: NativeParam<Value = V>,
{
    dispatch(context, move |rt, ctx| {
        let value = assigned::<V>(rt, ctx)?;
        let mut object = ObjMut::<B>::from_value(rt, ctx.this())?;
        *field.get_mut(&mut *object) = value;
        Ok(Value::Undefined)
    })
}

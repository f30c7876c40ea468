//! Turning native values into runtime objects.

use std::any::type_name;
use std::rc::Rc;

use tracing::debug;

use super::access::Alias;
use super::native::NativeObject;
use super::shared::Shared;
use crate::class::{ClassInfo, ClassRegistry};
use crate::error::BindError;
use crate::runtime::{Finalizer, ObjectId, Runtime};
use crate::value::Value;

fn class_for<T: 'static>(rt: &Runtime) -> Result<ClassInfo, BindError> {
    ClassRegistry::get(rt)
        .and_then(|classes| classes.class_of::<T>())
        .ok_or(BindError::UnboundType {
            type_name: type_name::<T>(),
        })
}

fn wrap<T: 'static>(
    rt: &mut Runtime,
    make: impl FnOnce(&ClassInfo) -> Result<NativeObject, BindError>,
) -> Result<Value, BindError> {
    let class = class_for::<T>(rt)?;
    let native = make(&class)?;
    let instance = rt.new_object_with_prototype(Some(class.prototype));
    attach(rt, instance, native)?;
    Ok(Value::Object(instance))
}

/// Wrap a copy of `value` in a new instance of `T`'s bound class.
pub fn wrap_value<T: 'static>(rt: &mut Runtime, value: T) -> Result<Value, BindError> {
    wrap::<T>(rt, |class| NativeObject::by_value(class.token, value))
}

/// Wrap a new owner of `shared` in an instance of `T`'s bound class.
pub fn wrap_shared<T: 'static>(rt: &mut Runtime, shared: Shared<T>) -> Result<Value, BindError> {
    wrap::<T>(rt, |class| Ok(NativeObject::by_shared(class.token, shared)))
}

/// Wrap a raw alias in an instance of `T`'s bound class.
pub fn wrap_alias<T: 'static>(rt: &mut Runtime, alias: Alias<T>) -> Result<Value, BindError> {
    wrap::<T>(rt, |class| Ok(NativeObject::by_alias(class.token, alias)))
}

/// Store `native` in the internal slot of `target`.
///
/// Owning handles report their footprint and register the finalizer that
/// releases them.
pub fn attach(rt: &mut Runtime, target: ObjectId, native: NativeObject) -> Result<(), BindError> {
    let owns = native.owns_memory();
    let footprint = native.footprint() as i64;
    rt.set_native(target, Rc::new(native))?;
    if owns {
        rt.adjust_external_memory(footprint);
        rt.set_finalizer(target, release(footprint))?;
    }
    Ok(())
}

fn release(footprint: i64) -> Finalizer {
    Box::new(move |rt: &mut Runtime, id: ObjectId| {
        if let Some(native) = rt.take_native(id) {
            debug!(
                type_name = native.type_name(),
                kind = %native.kind(),
                footprint,
                "releasing native object"
            );
            drop(native);
            rt.adjust_external_memory(-footprint);
        }
    })
}

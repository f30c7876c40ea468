//! The host runtime the binding layer targets.
//!
//! This is a deliberately small, single-threaded object model with just the
//! primitives a binding layer needs from an embedding engine:
//!
//! - a generational object heap with prototype links ([`ObjectId`])
//! - own properties, either data or accessor, with [`PropertyFlags`]
//! - call handlers ([`NativeFn`]) and a construct protocol
//! - one internal slot per object, holding an `Rc<NativeObject>`
//! - finalizers, mark/sweep collection and external memory accounting
//! - typed embedder data slots
//!
//! There is no script interpreter: "script code" is whatever drives
//! [`Runtime::call`], [`Runtime::construct`], [`Runtime::get`] and
//! [`Runtime::set`]. A real engine adapter replaces this module.

mod function;
mod gc;
mod heap;
mod options;
mod property;

pub use function::{CallContext, NativeCallable, NativeFn};
pub use gc::{Finalizer, GcStats};
pub use heap::ObjectId;
pub use options::RuntimeOptions;
pub use property::{Property, PropertyFlags, PropertyValue};

use std::any::{Any, TypeId};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{BindError, ScriptError};
use crate::object::NativeObject;
use crate::value::Value;
use heap::{ObjectHeap, ScriptObject};

/// A single-threaded runtime instance.
pub struct Runtime {
    heap: ObjectHeap,
    global: ObjectId,
    pins: FxHashMap<ObjectId, u32>,
    finalizers: FxHashMap<ObjectId, Finalizer>,
    external_memory: i64,
    options: RuntimeOptions,
    embedder_data: FxHashMap<TypeId, Rc<dyn Any>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    pub fn with_options(options: RuntimeOptions) -> Self {
        let mut heap = ObjectHeap::with_capacity(options.heap_capacity);
        let global = heap.allocate(ScriptObject::default());
        Self {
            heap,
            global,
            pins: FxHashMap::default(),
            finalizers: FxHashMap::default(),
            external_memory: 0,
            options,
            embedder_data: FxHashMap::default(),
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// The global object. Always reachable.
    pub fn global(&self) -> ObjectId {
        self.global
    }

    /// Number of live heap objects, including the global object.
    pub fn object_count(&self) -> usize {
        self.heap.len()
    }

    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.heap.get(id).is_some()
    }

    fn object(&self, id: ObjectId) -> Result<&ScriptObject, ScriptError> {
        self.heap
            .get(id)
            .ok_or_else(|| ScriptError::type_error("invalid object handle"))
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut ScriptObject, ScriptError> {
        self.heap
            .get_mut(id)
            .ok_or_else(|| ScriptError::type_error("invalid object handle"))
    }

    // ========================================================================
    // Object creation
    // ========================================================================

    /// A plain object without prototype.
    pub fn new_object(&mut self) -> ObjectId {
        self.heap.allocate(ScriptObject::default())
    }

    pub fn new_object_with_prototype(&mut self, prototype: Option<ObjectId>) -> ObjectId {
        self.heap.allocate(ScriptObject::with_prototype(prototype))
    }

    /// A callable object.
    pub fn new_function(&mut self, handler: NativeFn) -> ObjectId {
        let name = handler.name().to_string();
        self.heap.allocate(ScriptObject {
            call: Some(handler),
            name: Some(name),
            ..ScriptObject::default()
        })
    }

    /// A constructor function and its prototype object, linked through the
    /// `prototype` and `constructor` properties.
    pub fn new_constructor(&mut self, handler: NativeFn) -> (ObjectId, ObjectId) {
        let ctor = self.new_function(handler);
        let proto = self.new_object();
        let hidden = PropertyFlags::FROZEN | PropertyFlags::DONT_ENUM;
        if let Some(object) = self.heap.get_mut(ctor) {
            object
                .properties
                .insert("prototype".into(), Property::data(Value::Object(proto), hidden));
        }
        if let Some(object) = self.heap.get_mut(proto) {
            object
                .properties
                .insert("constructor".into(), Property::data(Value::Object(ctor), hidden));
        }
        (ctor, proto)
    }

    /// Replace (or install) the call handler of an existing object.
    pub fn set_call_handler(&mut self, id: ObjectId, handler: NativeFn) -> Result<(), ScriptError> {
        self.object_mut(id)?.call = Some(handler);
        Ok(())
    }

    pub fn is_callable(&self, id: ObjectId) -> bool {
        self.heap.get(id).is_some_and(|o| o.call.is_some())
    }

    /// Diagnostic name of a function object.
    pub fn function_name(&self, id: ObjectId) -> Option<&str> {
        self.heap.get(id)?.name.as_deref()
    }

    // ========================================================================
    // Prototype chain
    // ========================================================================

    pub fn prototype_of(&self, id: ObjectId) -> Result<Option<ObjectId>, ScriptError> {
        Ok(self.object(id)?.prototype)
    }

    pub fn set_prototype(
        &mut self,
        id: ObjectId,
        prototype: Option<ObjectId>,
    ) -> Result<(), ScriptError> {
        let mut cursor = prototype;
        while let Some(current) = cursor {
            if current == id {
                return Err(ScriptError::type_error("cyclic prototype chain"));
            }
            cursor = self.object(current)?.prototype;
        }
        self.object_mut(id)?.prototype = prototype;
        Ok(())
    }

    /// Whether `ancestor` appears on `id`'s prototype chain.
    pub fn inherits_from(&self, id: ObjectId, ancestor: ObjectId) -> bool {
        let mut cursor = self.heap.get(id).and_then(|o| o.prototype);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.heap.get(current).and_then(|o| o.prototype);
        }
        false
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Define or replace an own property, ignoring existing attributes.
    ///
    /// This is the embedder-side operation; scripts go through [`Runtime::set`].
    pub fn define(&mut self, id: ObjectId, name: &str, property: Property) -> Result<(), ScriptError> {
        self.object_mut(id)?
            .properties
            .insert(name.to_string(), property);
        Ok(())
    }

    pub fn define_value(
        &mut self,
        id: ObjectId,
        name: &str,
        value: Value,
        flags: PropertyFlags,
    ) -> Result<(), ScriptError> {
        self.define(id, name, Property::data(value, flags))
    }

    pub fn define_accessor(
        &mut self,
        id: ObjectId,
        name: &str,
        get: Option<NativeFn>,
        set: Option<NativeFn>,
        flags: PropertyFlags,
    ) -> Result<(), ScriptError> {
        self.define(id, name, Property::accessor(get, set, flags))
    }

    /// Own property, if any.
    pub fn own_property(&self, id: ObjectId, name: &str) -> Option<&Property> {
        self.heap.get(id)?.properties.get(name)
    }

    pub fn has_own(&self, id: ObjectId, name: &str) -> bool {
        self.own_property(id, name).is_some()
    }

    /// Whether the property exists on the object or its prototype chain.
    pub fn has(&self, id: ObjectId, name: &str) -> bool {
        self.find_property(id, name).is_some()
    }

    /// Enumerable own property names, sorted.
    pub fn own_keys(&self, id: ObjectId) -> Vec<String> {
        let mut keys: Vec<String> = self
            .heap
            .get(id)
            .map(|o| {
                o.properties
                    .iter()
                    .filter(|(_, p)| !p.flags.contains(PropertyFlags::DONT_ENUM))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn find_property(&self, id: ObjectId, name: &str) -> Option<(ObjectId, &Property)> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let object = self.heap.get(current)?;
            if let Some(property) = object.properties.get(name) {
                return Some((current, property));
            }
            cursor = object.prototype;
        }
        None
    }

    /// Script-level property read. Accessors run with `this` set to `id`.
    pub fn get(&mut self, id: ObjectId, name: &str) -> Result<Value, ScriptError> {
        self.object(id)?;
        let (holder, value) = match self.find_property(id, name) {
            None => return Ok(Value::Undefined),
            Some((holder, property)) => (holder, property.value.clone()),
        };
        match value {
            PropertyValue::Data(v) => Ok(v),
            PropertyValue::Accessor { get: Some(getter), .. } => {
                let ctx = CallContext::new(holder, Value::Object(id), Vec::new(), false);
                getter.call(self, &ctx)
            }
            PropertyValue::Accessor { get: None, .. } => Ok(Value::Undefined),
        }
    }

    /// Property read on an arbitrary value.
    pub fn get_value(&mut self, target: &Value, name: &str) -> Result<Value, ScriptError> {
        match target {
            Value::Object(id) => self.get(*id, name),
            other => Err(ScriptError::type_error(format!(
                "cannot read property '{name}' of {}",
                other.type_name()
            ))),
        }
    }

    /// Script-level property write with strict-mode semantics: writing a
    /// read-only property or a getter-only accessor is a `TypeError`.
    pub fn set(&mut self, id: ObjectId, name: &str, value: Value) -> Result<(), ScriptError> {
        self.object(id)?;
        let found = self
            .find_property(id, name)
            .map(|(holder, p)| (holder, p.value.clone(), p.flags));
        match found {
            Some((holder, PropertyValue::Accessor { set, .. }, _)) => match set {
                Some(setter) => {
                    let ctx = CallContext::new(holder, Value::Object(id), vec![value], false);
                    setter.call(self, &ctx).map(|_| ())
                }
                None => Err(ScriptError::type_error(format!(
                    "cannot set property '{name}' which has only a getter"
                ))),
            },
            Some((_, PropertyValue::Data(_), flags)) if flags.contains(PropertyFlags::READ_ONLY) => {
                Err(ScriptError::type_error(format!(
                    "cannot assign to read only property '{name}'"
                )))
            }
            Some((holder, PropertyValue::Data(_), _)) if holder == id => {
                if let Some(property) = self.object_mut(id)?.properties.get_mut(name) {
                    property.value = PropertyValue::Data(value);
                }
                Ok(())
            }
            _ => self.define_value(id, name, value, PropertyFlags::empty()),
        }
    }

    /// Property write on an arbitrary value.
    pub fn set_value(&mut self, target: &Value, name: &str, value: Value) -> Result<(), ScriptError> {
        match target {
            Value::Object(id) => self.set(*id, name, value),
            other => Err(ScriptError::type_error(format!(
                "cannot set property '{name}' of {}",
                other.type_name()
            ))),
        }
    }

    /// Script-level delete. Fails for `DONT_DELETE` properties.
    pub fn delete(&mut self, id: ObjectId, name: &str) -> Result<bool, ScriptError> {
        let object = self.object_mut(id)?;
        let flags = match object.properties.get(name) {
            None => return Ok(false),
            Some(p) => p.flags,
        };
        if flags.contains(PropertyFlags::DONT_DELETE) {
            return Err(ScriptError::type_error(format!(
                "cannot delete property '{name}'"
            )));
        }
        object.properties.remove(name);
        Ok(true)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    pub fn call(&mut self, function: &Value, this: Value, args: &[Value]) -> Result<Value, ScriptError> {
        #[cfg(feature = "profiling")]
        profiling::scope!("Runtime::call");

        let (id, handler) = self.handler_of(function, "a function")?;
        let ctx = CallContext::new(id, this, args.to_vec(), false);
        handler.call(self, &ctx)
    }

    /// Look up `name` on `target` and call it with `target` as receiver.
    pub fn call_method(&mut self, target: &Value, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
        let function = self.get_value(target, name)?;
        if function.is_undefined() {
            return Err(ScriptError::type_error(format!("'{name}' is not a function")));
        }
        self.call(&function, target.clone(), args)
    }

    /// `new ctor(...args)`: allocate an instance whose prototype is
    /// `ctor.prototype`, run the handler on it, and return the handler's
    /// object result if it produced one, else the instance.
    pub fn construct(&mut self, ctor: &Value, args: &[Value]) -> Result<Value, ScriptError> {
        #[cfg(feature = "profiling")]
        profiling::scope!("Runtime::construct");

        let (id, handler) = self.handler_of(ctor, "a constructor")?;
        let prototype = self.get(id, "prototype")?.as_object();
        let instance = self.new_object_with_prototype(prototype);
        let ctx = CallContext::new(id, Value::Object(instance), args.to_vec(), true);
        match handler.call(self, &ctx)? {
            result @ Value::Object(_) => Ok(result),
            _ => Ok(Value::Object(instance)),
        }
    }

    fn handler_of(&self, target: &Value, what: &str) -> Result<(ObjectId, NativeFn), ScriptError> {
        let id = target
            .as_object()
            .ok_or_else(|| ScriptError::type_error(format!("{} is not {what}", target.type_name())))?;
        let handler = self
            .object(id)?
            .call
            .clone()
            .ok_or_else(|| ScriptError::type_error(format!("object is not {what}")))?;
        Ok((id, handler))
    }

    // ========================================================================
    // Internal slot
    // ========================================================================

    /// The native object held in the internal slot.
    pub fn native(&self, id: ObjectId) -> Option<Rc<NativeObject>> {
        self.heap.get(id)?.internal.clone()
    }

    pub fn set_native(&mut self, id: ObjectId, native: Rc<NativeObject>) -> Result<(), BindError> {
        let object = self.object_mut(id)?;
        if object.internal.is_some() {
            return Err(BindError::AlreadyAttached);
        }
        object.internal = Some(native);
        Ok(())
    }

    /// Empty the internal slot.
    pub fn take_native(&mut self, id: ObjectId) -> Option<Rc<NativeObject>> {
        self.heap.get_mut(id)?.internal.take()
    }

    // ========================================================================
    // Embedder data
    // ========================================================================

    pub fn embedder_data<T: Any>(&self) -> Option<Rc<T>> {
        let data = self.embedder_data.get(&TypeId::of::<T>())?.clone();
        data.downcast::<T>().ok()
    }

    pub fn set_embedder_data<T: Any>(&mut self, data: Rc<T>) {
        self.embedder_data.insert(TypeId::of::<T>(), data);
    }

    pub fn embedder_data_or_insert_with<T: Any>(&mut self, init: impl FnOnce() -> T) -> Rc<T> {
        if let Some(existing) = self.embedder_data::<T>() {
            return existing;
        }
        let data = Rc::new(init());
        self.set_embedder_data(data.clone());
        data
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("heap", &self.heap)
            .field("pins", &self.pins.len())
            .field("finalizers", &self.finalizers.len())
            .field("external_memory", &self.external_memory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: Value) -> NativeFn {
        NativeFn::new("constant", move |_: &mut Runtime, _: &CallContext| Ok(value.clone()))
    }

    #[test]
    fn get_walks_prototype_chain() {
        let mut rt = Runtime::new();
        let base = rt.new_object();
        rt.define_value(base, "x", Value::Int(1), PropertyFlags::empty()).unwrap();
        let derived = rt.new_object_with_prototype(Some(base));
        assert_eq!(rt.get(derived, "x").unwrap(), Value::Int(1));
        assert_eq!(rt.get(derived, "missing").unwrap(), Value::Undefined);
        assert!(rt.has(derived, "x"));
        assert!(!rt.has_own(derived, "x"));
    }

    #[test]
    fn set_shadows_inherited_data() {
        let mut rt = Runtime::new();
        let base = rt.new_object();
        rt.define_value(base, "x", Value::Int(1), PropertyFlags::empty()).unwrap();
        let derived = rt.new_object_with_prototype(Some(base));
        rt.set(derived, "x", Value::Int(2)).unwrap();
        assert_eq!(rt.get(derived, "x").unwrap(), Value::Int(2));
        assert_eq!(rt.get(base, "x").unwrap(), Value::Int(1));
    }

    #[test]
    fn read_only_rejects_writes() {
        let mut rt = Runtime::new();
        let obj = rt.new_object();
        rt.define_value(obj, "k", Value::Int(1), PropertyFlags::FROZEN).unwrap();
        let err = rt.set(obj, "k", Value::Int(2)).unwrap_err();
        assert!(matches!(err, ScriptError::TypeError(_)));

        let child = rt.new_object_with_prototype(Some(obj));
        assert!(rt.set(child, "k", Value::Int(2)).is_err());
    }

    #[test]
    fn getter_only_accessor_rejects_writes() {
        let mut rt = Runtime::new();
        let obj = rt.new_object();
        rt.define_accessor(obj, "v", Some(constant(Value::Int(7))), None, PropertyFlags::empty())
            .unwrap();
        assert_eq!(rt.get(obj, "v").unwrap(), Value::Int(7));
        let err = rt.set(obj, "v", Value::Int(1)).unwrap_err();
        assert!(err.message().contains("only a getter"));
    }

    #[test]
    fn accessor_receives_original_receiver() {
        let mut rt = Runtime::new();
        let proto = rt.new_object();
        let getter = NativeFn::new("this", |_: &mut Runtime, ctx: &CallContext| Ok(ctx.this().clone()));
        rt.define_accessor(proto, "me", Some(getter), None, PropertyFlags::empty())
            .unwrap();
        let obj = rt.new_object_with_prototype(Some(proto));
        assert_eq!(rt.get(obj, "me").unwrap(), Value::Object(obj));
    }

    #[test]
    fn delete_respects_dont_delete() {
        let mut rt = Runtime::new();
        let obj = rt.new_object();
        rt.define_value(obj, "a", Value::Null, PropertyFlags::DONT_DELETE).unwrap();
        rt.define_value(obj, "b", Value::Null, PropertyFlags::empty()).unwrap();
        assert!(rt.delete(obj, "a").is_err());
        assert!(rt.delete(obj, "b").unwrap());
        assert!(!rt.delete(obj, "b").unwrap());
    }

    #[test]
    fn cyclic_prototype_is_rejected() {
        let mut rt = Runtime::new();
        let a = rt.new_object();
        let b = rt.new_object_with_prototype(Some(a));
        assert!(rt.set_prototype(a, Some(b)).is_err());
        assert!(rt.inherits_from(b, a));
    }

    #[test]
    fn call_non_function_is_type_error() {
        let mut rt = Runtime::new();
        let obj = rt.new_object();
        assert!(rt.call(&Value::Object(obj), Value::Undefined, &[]).is_err());
        assert!(rt.call(&Value::Int(1), Value::Undefined, &[]).is_err());
    }

    #[test]
    fn construct_links_prototype() {
        let mut rt = Runtime::new();
        let (ctor, proto) = rt.new_constructor(constant(Value::Undefined));
        let instance = rt.construct(&Value::Object(ctor), &[]).unwrap();
        let id = instance.as_object().unwrap();
        assert_eq!(rt.prototype_of(id).unwrap(), Some(proto));
        assert_eq!(rt.get(proto, "constructor").unwrap(), Value::Object(ctor));
    }

    #[test]
    fn construct_returns_handler_object() {
        let mut rt = Runtime::new();
        let other = rt.new_object();
        let ctor = rt.new_function(constant(Value::Object(other)));
        let result = rt.construct(&Value::Object(ctor), &[]).unwrap();
        assert_eq!(result, Value::Object(other));
    }

    #[test]
    fn call_method_passes_receiver() {
        let mut rt = Runtime::new();
        let obj = rt.new_object();
        let f = rt.new_function(NativeFn::new("self", |_: &mut Runtime, ctx: &CallContext| {
            Ok(ctx.this().clone())
        }));
        rt.define_value(obj, "me", Value::Object(f), PropertyFlags::empty()).unwrap();
        let result = rt.call_method(&Value::Object(obj), "me", &[]).unwrap();
        assert_eq!(result, Value::Object(obj));
    }

    #[test]
    fn embedder_data_is_typed() {
        let mut rt = Runtime::new();
        assert!(rt.embedder_data::<u32>().is_none());
        let first = rt.embedder_data_or_insert_with(|| 5u32);
        let second = rt.embedder_data_or_insert_with(|| 9u32);
        assert_eq!(*first, 5);
        assert!(Rc::ptr_eq(&first, &second));
        assert!(rt.embedder_data::<i64>().is_none());
    }

    #[test]
    fn own_keys_skip_hidden() {
        let mut rt = Runtime::new();
        let (ctor, _) = rt.new_constructor(constant(Value::Undefined));
        rt.define_value(ctor, "K", Value::Int(1), PropertyFlags::FROZEN).unwrap();
        assert_eq!(rt.own_keys(ctor), vec!["K".to_string()]);
    }
}

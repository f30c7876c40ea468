//! Class scopes.

use std::any::{TypeId, type_name};
use std::marker::PhantomData;
use std::rc::Rc;

use scriptbind_core::object::attach;
use scriptbind_core::{
    BindError, CallContext, Inherits, NativeFn, NativeObject, ObjectId, Property, PropertyFlags,
    RegistrationError, Runtime, ScriptError, Shared, ToRuntime, TypeHash, Value,
};
use scriptbind_registry::{MemberKind, NodeIndex};
use tracing::{debug, trace};

use super::field::Field;
use super::members;
use super::scope::{self, BindState, Opened, Scope, private::Node};
use crate::args::{ArgSpec, NativeParam};
use crate::invoke::{NativeConstructor, NativeFunction, NativeMethod};

pub(crate) fn open_derived<T, S, Sc>(scope: &mut Sc, name: &str) -> Result<Opened, RegistrationError>
where
    T: Inherits<S>,
    S: 'static,
    Sc: Scope,
{
    let classes = scope.state().classes.clone();
    let base = classes
        .class_of::<S>()
        .ok_or(RegistrationError::UnboundSuperClass {
            type_name: type_name::<S>(),
        })?;
    let opened = scope::open_class::<T, _>(scope, name)?;
    classes.link_parent::<T, S>()?;
    if let Some(prototype) = opened.prototype {
        scope.runtime().set_prototype(prototype, Some(base.prototype))?;
    }
    debug!(class = %opened.name, base = %base.name, "class extends base");
    Ok(opened)
}

/// Call handler of a bound constructor: builds the native object and stores
/// it in the new instance.
fn constructor_handler<F>(class: String, make: F) -> NativeFn
where
    F: Fn(&Runtime, &CallContext) -> Result<NativeObject, BindError> + 'static,
{
    NativeFn::new(class.clone(), move |rt, ctx| {
        if !ctx.is_construct_call() {
            return Err(scope::without_new(&class));
        }

        #[cfg(feature = "profiling")]
        profiling::scope!("scriptbind::construct", class.as_str());

        trace!(class = %class, args = ctx.arg_count(), "construct");
        let this = ctx
            .this()
            .as_object()
            .ok_or_else(|| ScriptError::type_error(format!("{class} constructed without an instance")))?;
        let native = make(rt, ctx)?;
        attach(rt, this, native)?;
        Ok(Value::Undefined)
    })
}

/// A class being populated.
///
/// Instance members (methods, properties, variables) are installed on the
/// prototype, static members and constants on the constructor.
///
/// # Example
///
/// ```ignore
/// Binding::new(&mut rt)
///     .begin_class::<Counter>("Counter")?
///     .add_constructor(|start: i32| Counter { count: start })?
///     .add_function("increment", |c: &mut Counter| c.count += 1)?
///     .add_property_readonly("count", |c: &Counter| c.count)?
///     .add_static_function("zero", || Counter { count: 0 })?
///     .end_class();
/// ```
pub struct ClassBuilder<T: 'static, P> {
    parent: P,
    node: NodeIndex,
    ctor: ObjectId,
    proto: ObjectId,
    token: TypeHash,
    /// Dotted class name.
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static, P: Scope> Node for ClassBuilder<T, P> {
    fn state(&self) -> &Rc<BindState> {
        self.parent.state()
    }

    fn node(&self) -> NodeIndex {
        self.node
    }
}

impl<T: 'static, P: Scope> Scope for ClassBuilder<T, P> {
    fn runtime(&mut self) -> &mut Runtime {
        self.parent.runtime()
    }

    fn object(&self) -> ObjectId {
        self.ctor
    }
}

impl<T: 'static, P: Scope> ClassBuilder<T, P> {
    pub(crate) fn new(parent: P, opened: Opened) -> Self {
        Self {
            parent,
            node: opened.node,
            ctor: opened.object,
            proto: opened.prototype.unwrap_or(opened.object),
            token: opened.token,
            name: opened.name,
            _marker: PhantomData,
        }
    }

    fn context(&self, member: &str) -> String {
        format!("{}.{member}", self.name)
    }

    /// Methods and accessors may be declared on `T` or any of its bound
    /// ancestors.
    fn check_receiver<R: 'static>(&self, context: &str) -> Result<(), RegistrationError> {
        if self
            .state()
            .classes
            .is_ancestor_or_self(TypeId::of::<T>(), TypeId::of::<R>())
        {
            Ok(())
        } else {
            Err(RegistrationError::UnrelatedReceiver {
                context: context.to_string(),
                receiver: type_name::<R>(),
                class: self.name.clone(),
            })
        }
    }

    fn install_accessors(
        mut self,
        target: ObjectId,
        name: &str,
        (getter, setter): (NativeFn, Option<NativeFn>),
        kind: MemberKind,
    ) -> Result<Self, RegistrationError> {
        let property = Property::accessor(Some(getter), setter, PropertyFlags::FROZEN);
        scope::install(&mut self, target, name, property, kind)?;
        Ok(self)
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    pub fn end_class(self) -> P {
        self.parent
    }

    /// Open a class nested in this one; it becomes a static member.
    pub fn begin_class<U: 'static>(mut self, name: &str) -> Result<ClassBuilder<U, Self>, RegistrationError> {
        let opened = scope::open_class::<U, _>(&mut self, name)?;
        Ok(ClassBuilder::new(self, opened))
    }

    pub fn begin_extend_class<U, S>(mut self, name: &str) -> Result<ClassBuilder<U, Self>, RegistrationError>
    where
        U: Inherits<S>,
        S: 'static,
    {
        let opened = open_derived::<U, S, _>(&mut self, name)?;
        Ok(ClassBuilder::new(self, opened))
    }

    // ========================================================================
    // Constructors
    // ========================================================================

    fn install_constructor(mut self, handler: NativeFn, kind: MemberKind) -> Result<Self, RegistrationError> {
        let ctor = self.ctor;
        self.runtime().set_call_handler(ctor, handler)?;
        let node = self.node;
        self.state()
            .scopes
            .borrow_mut()
            .record_member(node, "constructor", kind);
        Ok(self)
    }

    fn checked_constructor<M, F>(&self, spec: &ArgSpec) -> Result<(), RegistrationError>
    where
        F: NativeConstructor<T, M>,
    {
        spec.validate(&self.context("constructor"), &F::params())
    }

    /// Construct instances by value: the native value lives inside the
    /// wrapper and is dropped when the instance is collected.
    pub fn add_constructor<M, F>(self, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeConstructor<T, M>,
    {
        let spec = ArgSpec::infer(&F::params());
        self.add_constructor_with(spec, f)
    }

    pub fn add_constructor_with<M, F>(self, spec: ArgSpec, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeConstructor<T, M>,
    {
        self.checked_constructor::<M, F>(&spec)?;
        let token = self.token;
        let handler = constructor_handler(self.name.clone(), move |rt, ctx| {
            let value = f.construct(rt, &spec, ctx.args())?;
            NativeObject::by_value(token, value)
        });
        self.install_constructor(handler, MemberKind::Constructor)
    }

    /// Construct instances as [`Shared`] objects, so native code can keep
    /// its own handles to them.
    pub fn add_shared_constructor<M, F>(self, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeConstructor<T, M>,
    {
        let spec = ArgSpec::infer(&F::params());
        self.add_shared_constructor_with(spec, f)
    }

    pub fn add_shared_constructor_with<M, F>(self, spec: ArgSpec, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeConstructor<T, M>,
    {
        self.checked_constructor::<M, F>(&spec)?;
        let token = self.token;
        let handler = constructor_handler(self.name.clone(), move |rt, ctx| {
            let value = f.construct(rt, &spec, ctx.args())?;
            Ok(NativeObject::by_shared(token, Shared::new(value)))
        });
        self.install_constructor(handler, MemberKind::Constructor)
    }

    /// Like [`add_shared_constructor_with`](Self::add_shared_constructor_with),
    /// releasing each instance through `deleter` once the last handle is gone.
    pub fn add_constructor_with_deleter<M, F, D>(
        self,
        spec: ArgSpec,
        f: F,
        deleter: D,
    ) -> Result<Self, RegistrationError>
    where
        F: NativeConstructor<T, M>,
        D: Fn(Box<T>) + 'static,
    {
        self.checked_constructor::<M, F>(&spec)?;
        let token = self.token;
        let deleter = Rc::new(deleter);
        let handler = constructor_handler(self.name.clone(), move |rt, ctx| {
            let value = f.construct(rt, &spec, ctx.args())?;
            let deleter = deleter.clone();
            let shared = Shared::with_deleter(Box::new(value), move |boxed| deleter(boxed));
            Ok(NativeObject::by_shared(token, shared))
        });
        self.install_constructor(handler, MemberKind::Constructor)
    }

    /// Replace the constructor with a factory. The class can then be called
    /// with or without `new`, and the factory's result is returned as is.
    pub fn add_factory<M, F>(self, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeFunction<M>,
    {
        let spec = ArgSpec::infer(&F::params());
        self.add_factory_with(spec, f)
    }

    pub fn add_factory_with<M, F>(self, spec: ArgSpec, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeFunction<M>,
    {
        let context = self.context("factory");
        members::check_function::<M, F>(&context, &spec)?;
        let handler = members::function(context, spec, f);
        self.install_constructor(handler, MemberKind::Factory)
    }

    // ========================================================================
    // Instance members
    // ========================================================================

    /// Add a method. The first parameter of `f` is the receiver, `&S` or
    /// `&mut S` where `S` is `T` or one of its bound ancestors.
    pub fn add_function<M, F>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeMethod<M>,
    {
        let spec = ArgSpec::infer(&F::params());
        self.add_function_with(name, spec, f)
    }

    pub fn add_function_with<M, F>(mut self, name: &str, spec: ArgSpec, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeMethod<M>,
    {
        let context = self.context(name);
        spec.validate(&context, &F::params())?;
        self.check_receiver::<F::Receiver>(&context)?;
        let handler = members::method(context, spec, f);
        let target = self.proto;
        scope::install_function(&mut self, target, name, handler, MemberKind::Method)?;
        Ok(self)
    }

    /// Add an accessor pair: `get(&S) -> R` and `set(&mut S, V)`.
    pub fn add_property<GM, G, SM, S>(self, name: &str, get: G, set: S) -> Result<Self, RegistrationError>
    where
        G: NativeMethod<GM>,
        S: NativeMethod<SM>,
    {
        let context = self.context(name);
        self.check_receiver::<G::Receiver>(&context)?;
        self.check_receiver::<S::Receiver>(&context)?;
        let accessors = members::instance_property(context, get, Some(set))?;
        let target = self.proto;
        self.install_accessors(target, name, accessors, MemberKind::Property { writable: true })
    }

    /// Add a getter-only accessor; script writes fail.
    pub fn add_property_readonly<GM, G>(self, name: &str, get: G) -> Result<Self, RegistrationError>
    where
        G: NativeMethod<GM>,
    {
        let context = self.context(name);
        self.check_receiver::<G::Receiver>(&context)?;
        let accessors = members::instance_property(context, get, None::<fn(&T)>)?;
        let target = self.proto;
        self.install_accessors(target, name, accessors, MemberKind::Property { writable: false })
    }

    /// Expose a field by copy. See [`field!`](crate::field).
    pub fn add_variable<B, V>(self, name: &str, field: Field<B, V>, writable: bool) -> Result<Self, RegistrationError>
    where
        B: 'static,
        V: Clone + ToRuntime + NativeParam<Value = V>,
    {
        let context = self.context(name);
        self.check_receiver::<B>(&context)?;
        let accessors = members::field(context, field, writable);
        let target = self.proto;
        let kind = MemberKind::Variable {
            writable,
            by_ref: false,
        };
        self.install_accessors(target, name, accessors, kind)
    }

    /// Expose a field of a bound class type by reference: reads return a
    /// wrapper aliasing the field inside this instance.
    pub fn add_variable_ref<B, V>(self, name: &str, field: Field<B, V>, writable: bool) -> Result<Self, RegistrationError>
    where
        B: 'static,
        V: NativeParam<Value = V>,
    {
        let context = self.context(name);
        self.check_receiver::<B>(&context)?;
        let accessors = members::field_ref(context, field, writable);
        let target = self.proto;
        let kind = MemberKind::Variable {
            writable,
            by_ref: true,
        };
        self.install_accessors(target, name, accessors, kind)
    }

    // ========================================================================
    // Static members
    // ========================================================================

    pub fn add_static_function<M, F>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeFunction<M>,
    {
        let spec = ArgSpec::infer(&F::params());
        self.add_static_function_with(name, spec, f)
    }

    pub fn add_static_function_with<M, F>(mut self, name: &str, spec: ArgSpec, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeFunction<M>,
    {
        let context = self.context(name);
        members::check_function::<M, F>(&context, &spec)?;
        let handler = members::function(context, spec, f);
        let target = self.ctor;
        scope::install_function(&mut self, target, name, handler, MemberKind::StaticFunction)?;
        Ok(self)
    }

    pub fn add_static_property<GM, G, SM, S>(self, name: &str, get: G, set: S) -> Result<Self, RegistrationError>
    where
        G: NativeFunction<GM>,
        S: NativeFunction<SM>,
    {
        let accessors = members::static_property(self.context(name), get, Some(set))?;
        let target = self.ctor;
        self.install_accessors(target, name, accessors, MemberKind::StaticProperty { writable: true })
    }

    pub fn add_static_property_readonly<GM, G>(self, name: &str, get: G) -> Result<Self, RegistrationError>
    where
        G: NativeFunction<GM>,
    {
        let accessors = members::static_property(self.context(name), get, None::<fn()>)?;
        let target = self.ctor;
        self.install_accessors(target, name, accessors, MemberKind::StaticProperty { writable: false })
    }

    pub fn add_static_variable<V>(self, name: &str, cell: Shared<V>, writable: bool) -> Result<Self, RegistrationError>
    where
        V: Clone + ToRuntime + NativeParam<Value = V>,
    {
        let accessors = members::variable(self.context(name), cell, writable);
        let target = self.ctor;
        let kind = MemberKind::StaticVariable {
            writable,
            by_ref: false,
        };
        self.install_accessors(target, name, accessors, kind)
    }

    pub fn add_static_variable_ref<V>(self, name: &str, cell: Shared<V>, writable: bool) -> Result<Self, RegistrationError>
    where
        V: NativeParam<Value = V>,
    {
        let accessors = members::variable_ref(self.context(name), cell, writable);
        let target = self.ctor;
        let kind = MemberKind::StaticVariable {
            writable,
            by_ref: true,
        };
        self.install_accessors(target, name, accessors, kind)
    }

    /// Add a frozen data property on the constructor.
    pub fn add_constant<V: ToRuntime>(mut self, name: &str, value: V) -> Result<Self, RegistrationError> {
        let value = value
            .to_runtime(self.runtime())
            .map_err(|source| RegistrationError::Value {
                name: self.context(name),
                source,
            })?;
        let target = self.ctor;
        let property = Property::data(value, PropertyFlags::FROZEN);
        scope::install(&mut self, target, name, property, MemberKind::Constant)?;
        Ok(self)
    }
}

//! Module scopes and the root of the builder.

use std::rc::Rc;

use scriptbind_core::{
    Inherits, NativeFn, ObjectId, Property, PropertyFlags, RegistrationError, Runtime,
    ScriptError, Shared, ToRuntime, Value,
};
use scriptbind_registry::{MemberKind, NodeIndex, ScopeKind};
use tracing::{debug, trace};

use super::class::ClassBuilder;
use super::members;
use super::scope::{self, BindState, Scope, private::Node};
use crate::args::{ArgSpec, NativeParam};
use crate::invoke::NativeFunction;

/// The global scope: the bottom of every builder chain.
pub struct Root<'rt> {
    rt: &'rt mut Runtime,
    state: Rc<BindState>,
    node: NodeIndex,
    global: ObjectId,
}

impl Node for Root<'_> {
    fn state(&self) -> &Rc<BindState> {
        &self.state
    }

    fn node(&self) -> NodeIndex {
        self.node
    }
}

impl Scope for Root<'_> {
    fn runtime(&mut self) -> &mut Runtime {
        &mut *self.rt
    }

    fn object(&self) -> ObjectId {
        self.global
    }
}

/// Builder entry point. Members added directly to a `Binding` land on the
/// global object.
///
/// # Example
///
/// ```ignore
/// Binding::new(&mut rt)
///     .begin_module("math")?
///     .add_function("hypot", |a: f64, b: f64| a.hypot(b))?
///     .add_constant("PI", std::f64::consts::PI)?
///     .end_module();
/// ```
pub type Binding<'rt> = ModuleBuilder<Root<'rt>>;

impl<'rt> ModuleBuilder<Root<'rt>> {
    pub fn new(rt: &'rt mut Runtime) -> Self {
        let state = BindState::install(rt);
        let node = state.scopes.borrow().root();
        let global = rt.global();
        ModuleBuilder {
            parent: Root {
                rt,
                state,
                node,
                global,
            },
            node,
            object: global,
            name: String::new(),
        }
    }

    /// Registered members of the module or class at a dotted path.
    pub fn members(&self, path: &str) -> Option<Vec<(String, MemberKind)>> {
        scope::describe(&*self.parent.rt, path)
    }
}

/// A module being populated. Returned by
/// [`begin_module`](ModuleBuilder::begin_module); [`end_module`](ModuleBuilder::end_module)
/// returns to the enclosing scope.
///
/// Reopening a module that already exists adds to it.
pub struct ModuleBuilder<P> {
    parent: P,
    node: NodeIndex,
    object: ObjectId,
    /// Dotted name, empty for the global scope.
    name: String,
}

impl<P: Scope> Node for ModuleBuilder<P> {
    fn state(&self) -> &Rc<BindState> {
        self.parent.state()
    }

    fn node(&self) -> NodeIndex {
        self.node
    }
}

impl<P: Scope> Scope for ModuleBuilder<P> {
    fn runtime(&mut self) -> &mut Runtime {
        self.parent.runtime()
    }

    fn object(&self) -> ObjectId {
        self.object
    }
}

impl<P: Scope> ModuleBuilder<P> {
    fn context(&self, member: &str) -> String {
        if self.name.is_empty() {
            member.to_string()
        } else {
            format!("{}.{member}", self.name)
        }
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    /// Open (or reopen) the nested module `name`.
    pub fn begin_module(mut self, name: &str) -> Result<ModuleBuilder<Self>, RegistrationError> {
        let opened = scope::open_module(&mut self, name)?;
        Ok(ModuleBuilder {
            parent: self,
            node: opened.node,
            object: opened.object,
            name: opened.name,
        })
    }

    pub fn end_module(self) -> P {
        self.parent
    }

    /// Open (or reopen) the class `name` bound to `T`.
    pub fn begin_class<T: 'static>(mut self, name: &str) -> Result<ClassBuilder<T, Self>, RegistrationError> {
        let opened = scope::open_class::<T, _>(&mut self, name)?;
        Ok(ClassBuilder::new(self, opened))
    }

    /// Open the class `name` bound to `T`, deriving from the class bound to
    /// `S`. Instances of `T` are accepted wherever an `S` is expected.
    pub fn begin_extend_class<T, S>(mut self, name: &str) -> Result<ClassBuilder<T, Self>, RegistrationError>
    where
        T: Inherits<S>,
        S: 'static,
    {
        let opened = super::class::open_derived::<T, S, _>(&mut self, name)?;
        Ok(ClassBuilder::new(self, opened))
    }

    // ========================================================================
    // Functions
    // ========================================================================

    pub fn add_function<M, F>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeFunction<M>,
    {
        let spec = ArgSpec::infer(&F::params());
        self.add_function_with(name, spec, f)
    }

    /// Add a function with explicit argument slots.
    ///
    /// ```ignore
    /// builder.add_function_with("clamp", args![reference, required, required], clamp)?
    /// ```
    pub fn add_function_with<M, F>(mut self, name: &str, spec: ArgSpec, f: F) -> Result<Self, RegistrationError>
    where
        F: NativeFunction<M>,
    {
        let context = self.context(name);
        members::check_function::<M, F>(&context, &spec)?;
        let handler = members::function(context, spec, f);
        let target = self.object;
        scope::install_function(&mut self, target, name, handler, MemberKind::Function)?;
        Ok(self)
    }

    /// Make the module object callable: calling it (with or without `new`)
    /// runs `f`.
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
        self.install_factory(handler)
    }

    /// Make calling the module forward to its member `name`: a nested class
    /// is constructed, anything else is called.
    pub fn add_factory_forward(self, name: &str) -> Result<Self, RegistrationError> {
        let node = self.node;
        let module = self.object;
        let target = name.to_string();
        let context = self.context(name);
        let handler = NativeFn::new(context.clone(), move |rt: &mut Runtime, ctx| {
            trace!(module = %context, "forwarding call");
            let is_class = BindState::get(rt).is_some_and(|state| {
                let scopes = state.scopes.borrow();
                scopes
                    .find_child(node, &target)
                    .and_then(|child| scopes.scope(child))
                    .is_some_and(|data| matches!(data.kind, ScopeKind::Class { .. }))
            });
            let callee = rt.get(module, &target)?;
            if callee.is_undefined() {
                return Err(ScriptError::type_error(format!("'{context}' is not a function")));
            }
            if is_class {
                rt.construct(&callee, ctx.args())
            } else {
                rt.call(&callee, Value::Object(module), ctx.args())
            }
        });
        self.install_factory(handler)
    }

    fn install_factory(mut self, handler: NativeFn) -> Result<Self, RegistrationError> {
        let module = self.object;
        if module == self.runtime().global() {
            return Err(RegistrationError::ScopeKindMismatch {
                name: "factory".to_string(),
                existing: ScopeKind::Root.describe().to_string(),
            });
        }
        self.runtime().set_call_handler(module, handler)?;
        let node = self.node;
        self.state()
            .scopes
            .borrow_mut()
            .record_member(node, "constructor", MemberKind::Factory);
        debug!(module = %self.name, "module made callable");
        Ok(self)
    }

    // ========================================================================
    // Properties, variables and constants
    // ========================================================================

    /// Add an accessor pair backed by free functions.
    pub fn add_property<GM, G, SM, S>(mut self, name: &str, get: G, set: S) -> Result<Self, RegistrationError>
    where
        G: NativeFunction<GM>,
        S: NativeFunction<SM>,
    {
        let (getter, setter) = members::static_property(self.context(name), get, Some(set))?;
        let target = self.object;
        let property = Property::accessor(Some(getter), setter, PropertyFlags::FROZEN);
        scope::install(&mut self, target, name, property, MemberKind::Property { writable: true })?;
        Ok(self)
    }

    /// Add a getter-only accessor; script writes fail.
    pub fn add_property_readonly<GM, G>(mut self, name: &str, get: G) -> Result<Self, RegistrationError>
    where
        G: NativeFunction<GM>,
    {
        let (getter, _) = members::static_property(self.context(name), get, None::<fn()>)?;
        let target = self.object;
        let property = Property::accessor(Some(getter), None, PropertyFlags::FROZEN);
        scope::install(&mut self, target, name, property, MemberKind::Property { writable: false })?;
        Ok(self)
    }

    /// Expose a native cell by copy: reads convert its current value, writes
    /// (when `writable`) replace it.
    pub fn add_variable<V>(mut self, name: &str, cell: Shared<V>, writable: bool) -> Result<Self, RegistrationError>
    where
        V: Clone + ToRuntime + NativeParam<Value = V>,
    {
        let (getter, setter) = members::variable(self.context(name), cell, writable);
        let target = self.object;
        let property = Property::accessor(Some(getter), setter, PropertyFlags::FROZEN);
        let kind = MemberKind::Variable {
            writable,
            by_ref: false,
        };
        scope::install(&mut self, target, name, property, kind)?;
        Ok(self)
    }

    /// Expose a native cell of a bound class by reference: reads wrap the
    /// cell itself.
    pub fn add_variable_ref<V>(mut self, name: &str, cell: Shared<V>, writable: bool) -> Result<Self, RegistrationError>
    where
        V: NativeParam<Value = V>,
    {
        let (getter, setter) = members::variable_ref(self.context(name), cell, writable);
        let target = self.object;
        let property = Property::accessor(Some(getter), setter, PropertyFlags::FROZEN);
        let kind = MemberKind::Variable {
            writable,
            by_ref: true,
        };
        scope::install(&mut self, target, name, property, kind)?;
        Ok(self)
    }

    /// Add a frozen data property holding `value`.
    pub fn add_constant<V: ToRuntime>(mut self, name: &str, value: V) -> Result<Self, RegistrationError> {
        let value = value
            .to_runtime(self.runtime())
            .map_err(|source| RegistrationError::Value {
                name: self.context(name),
                source,
            })?;
        let target = self.object;
        let property = Property::data(value, PropertyFlags::FROZEN);
        scope::install(&mut self, target, name, property, MemberKind::Constant)?;
        Ok(self)
    }
}

//! Builder scopes and the binding state kept in the runtime.

use std::any::type_name;
use std::cell::RefCell;
use std::rc::Rc;

use scriptbind_core::{
    ClassRegistry, NativeFn, ObjectId, Property, PropertyFlags, RegistrationError, Runtime,
    ScriptError, TypeHash, Value,
};
use scriptbind_registry::{MemberKind, NodeIndex, ScopeData, ScopeKind, ScopeTree};
use tracing::{debug, warn};

/// Everything the builder records about one runtime.
///
/// Stored in the runtime's embedder data next to the [`ClassRegistry`], so
/// every builder opened on the same runtime sees the same scopes.
pub struct BindState {
    pub(crate) classes: Rc<ClassRegistry>,
    pub(crate) scopes: RefCell<ScopeTree>,
}

impl BindState {
    pub(crate) fn install(rt: &mut Runtime) -> Rc<Self> {
        if let Some(state) = rt.embedder_data::<Self>() {
            return state;
        }
        let classes = ClassRegistry::install(rt);
        let global = rt.global();
        rt.embedder_data_or_insert_with(|| BindState {
            classes,
            scopes: RefCell::new(ScopeTree::new(global)),
        })
    }

    pub(crate) fn get(rt: &Runtime) -> Option<Rc<Self>> {
        rt.embedder_data::<Self>()
    }
}

pub(crate) mod private {
    use std::rc::Rc;

    use scriptbind_registry::NodeIndex;

    use super::BindState;

    pub trait Node {
        fn state(&self) -> &Rc<BindState>;
        fn node(&self) -> NodeIndex;
    }
}

/// A position in the builder's scope stack: the global scope, a module or a
/// class.
pub trait Scope: private::Node {
    fn runtime(&mut self) -> &mut Runtime;

    /// The scope's runtime object: the global object, a module object or a
    /// class constructor.
    fn object(&self) -> ObjectId;
}

/// Registered members of the module or class at a dotted path (`""` for the
/// global scope), sorted by name.
pub fn describe(rt: &Runtime, path: &str) -> Option<Vec<(String, MemberKind)>> {
    let state = BindState::get(rt)?;
    let scopes = state.scopes.borrow();
    let node = scopes.resolve(path)?;
    Some(scopes.members(node))
}

// ============================================================================
// Member installation
// ============================================================================

/// Define `property` on `target` and record it in the scope. A name held by
/// a nested module or class cannot be replaced by a plain member.
pub(crate) fn install<S: Scope>(
    scope: &mut S,
    target: ObjectId,
    name: &str,
    property: Property,
    kind: MemberKind,
) -> Result<(), RegistrationError> {
    let child = {
        let scopes = scope.state().scopes.borrow();
        scopes
            .find_child(scope.node(), name)
            .and_then(|child| scopes.scope(child))
            .map(|data| data.kind)
    };
    if let Some(existing) = child {
        let qualified = qualified(scope, name);
        return Err(mismatch(qualified, existing.describe()));
    }
    scope.runtime().define(target, name, property)?;
    let node = scope.node();
    let previous = scope.state().scopes.borrow_mut().record_member(node, name, kind);
    if let Some(previous) = previous {
        warn!(member = name, %previous, replacement = %kind, "member replaced");
    }
    Ok(())
}

/// Install a callable as a frozen data property.
pub(crate) fn install_function<S: Scope>(
    scope: &mut S,
    target: ObjectId,
    name: &str,
    handler: NativeFn,
    kind: MemberKind,
) -> Result<(), RegistrationError> {
    let function = scope.runtime().new_function(handler);
    install(
        scope,
        target,
        name,
        Property::data(Value::Object(function), PropertyFlags::FROZEN),
        kind,
    )
}

// ============================================================================
// Opening scopes
// ============================================================================

/// A module or class scope found or created under a parent.
pub(crate) struct Opened {
    pub node: NodeIndex,
    pub object: ObjectId,
    pub prototype: Option<ObjectId>,
    pub token: TypeHash,
    pub name: String,
}

fn mismatch(name: String, existing: impl ToString) -> RegistrationError {
    RegistrationError::ScopeKindMismatch {
        name,
        existing: existing.to_string(),
    }
}

/// The existing child scope `name`, or an error when the name holds some
/// other kind of member.
fn existing_child<S: Scope>(
    scope: &S,
    name: &str,
    qualified: &str,
) -> Result<Option<(NodeIndex, ScopeKind, ObjectId, Option<ObjectId>)>, RegistrationError> {
    let scopes = scope.state().scopes.borrow();
    let parent = scope.node();
    if let Some(node) = scopes.find_child(parent, name) {
        return Ok(scopes
            .scope(node)
            .map(|data| (node, data.kind, data.object, data.prototype)));
    }
    match scopes.scope(parent).and_then(|data| data.member(name)) {
        Some(kind) => Err(mismatch(qualified.to_string(), kind)),
        None => Ok(None),
    }
}

fn qualified<S: Scope>(scope: &S, name: &str) -> String {
    scope.state().scopes.borrow().qualified_name(scope.node(), name)
}

pub(crate) fn open_module<S: Scope>(scope: &mut S, name: &str) -> Result<Opened, RegistrationError> {
    let qualified = qualified(scope, name);

    if let Some((node, kind, object, _)) = existing_child(scope, name, &qualified)? {
        if kind != ScopeKind::Module {
            return Err(mismatch(qualified, kind.describe()));
        }
        debug!(module = %qualified, "module reopened");
        return Ok(Opened {
            node,
            object,
            prototype: None,
            token: TypeHash::EMPTY,
            name: qualified,
        });
    }

    let parent_object = scope.object();
    let rt = scope.runtime();
    let object = rt.new_object();
    rt.define(
        parent_object,
        name,
        Property::data(Value::Object(object), PropertyFlags::FROZEN),
    )?;
    let parent = scope.node();
    let node = scope.state().scopes.borrow_mut().add_child(
        parent,
        name,
        ScopeData::new(ScopeKind::Module, object, None),
    );
    debug!(module = %qualified, "module created");
    Ok(Opened {
        node,
        object,
        prototype: None,
        token: TypeHash::EMPTY,
        name: qualified,
    })
}

/// Error raised by a class constructor called without `new`.
pub(crate) fn without_new(class: &str) -> ScriptError {
    ScriptError::type_error(format!(
        "class constructor {class} cannot be invoked without 'new'"
    ))
}

/// Call handler of a class with no constructor bound: instances get an empty
/// internal slot.
fn empty_constructor(class: String) -> NativeFn {
    NativeFn::new(class.clone(), move |_rt, ctx| {
        if !ctx.is_construct_call() {
            return Err(without_new(&class));
        }
        Ok(Value::Undefined)
    })
}

pub(crate) fn open_class<T: 'static, S: Scope>(
    scope: &mut S,
    name: &str,
) -> Result<Opened, RegistrationError> {
    let qualified = qualified(scope, name);
    let classes = scope.state().classes.clone();

    if let Some((node, kind, object, prototype)) = existing_child(scope, name, &qualified)? {
        let ScopeKind::Class { token } = kind else {
            return Err(mismatch(qualified, kind.describe()));
        };
        let Some(info) = classes.class_by_token(token) else {
            return Err(mismatch(qualified, kind.describe()));
        };
        if classes.class_of::<T>().is_none_or(|own| own.token != token) {
            return Err(RegistrationError::NameBoundToOtherType {
                name: qualified,
                existing: info.type_name,
            });
        }
        debug!(class = %qualified, rust_type = type_name::<T>(), "class reopened");
        return Ok(Opened {
            node,
            object,
            prototype,
            token,
            name: qualified,
        });
    }

    let rt = scope.runtime();
    let (ctor, proto) = rt.new_constructor(empty_constructor(qualified.clone()));
    let info = classes.register::<T>(&qualified, ctor, proto)?;

    let parent_object = scope.object();
    scope.runtime().define(
        parent_object,
        name,
        Property::data(Value::Object(ctor), PropertyFlags::FROZEN),
    )?;
    let parent = scope.node();
    let node = scope.state().scopes.borrow_mut().add_child(
        parent,
        name,
        ScopeData::new(ScopeKind::Class { token: info.token }, ctor, Some(proto)),
    );
    Ok(Opened {
        node,
        object: ctor,
        prototype: Some(proto),
        token: info.token,
        name: qualified,
    })
}

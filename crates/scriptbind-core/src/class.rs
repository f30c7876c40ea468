//! Bound classes, identity tokens and ancestry.
//!
//! The registry is an arena of class records. Each record carries the
//! identity token of its qualified name, the Rust type it binds, and an
//! index link to its super class together with an upcast thunk that moves a
//! pointer from the derived value to its base sub-object.
//!
//! Downcasts start at the record named by a native object's token, which
//! must bind the Rust type actually stored, and walk parent links until the requested type is found, applying each thunk on
//! the way. The script-visible prototype chain is never consulted: scripts
//! can rewrite prototypes, but not this arena.

use std::any::{TypeId, type_name};
use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{BindError, RegistrationError};
use crate::object::NativeObject;
use crate::runtime::{ObjectId, Runtime};
use crate::type_hash::TypeHash;

/// Declares that `Self` embeds a `Base` sub-object.
///
/// Implement it with the [`inherits!`](crate::inherits) macro.
///
/// # Safety
///
/// `upcast` must return a pointer to a `Base` stored inside `*ptr`, derived
/// without creating references.
pub unsafe trait Inherits<Base: 'static>: 'static {
    /// # Safety
    ///
    /// `ptr` points to a live `Self`.
    unsafe fn upcast(ptr: *mut Self) -> *mut Base;
}

/// Implement [`Inherits`] by naming the field that holds the base.
///
/// ```
/// use scriptbind_core::inherits;
///
/// struct Shape { sides: u32 }
/// struct Square { shape: Shape, edge: f64 }
///
/// inherits!(Square: Shape => shape);
/// ```
#[macro_export]
macro_rules! inherits {
    ($derived:ty : $base:ty => $($field:ident).+) => {
        unsafe impl $crate::Inherits<$base> for $derived {
            unsafe fn upcast(ptr: *mut Self) -> *mut $base {
                unsafe { &raw mut (*ptr).$($field).+ }
            }
        }
    };
}

type Upcast = unsafe fn(*mut u8) -> *mut u8;

unsafe fn upcast_erased<D: Inherits<B>, B: 'static>(ptr: *mut u8) -> *mut u8 {
    unsafe { D::upcast(ptr.cast::<D>()).cast::<u8>() }
}

/// Whether a downcast may walk to ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// The requested class or any class derived from it.
    Derived,
    /// Only the requested class itself.
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Public view of a class record.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub id: ClassId,
    /// Dotted qualified name, e.g. `"geometry.Point"`.
    pub name: String,
    pub token: TypeHash,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub parent: Option<ClassId>,
    pub constructor: ObjectId,
    pub prototype: ObjectId,
}

struct ClassRecord {
    info: ClassInfo,
    upcast: Option<Upcast>,
}

#[derive(Default)]
struct Registry {
    records: Vec<ClassRecord>,
    by_type: FxHashMap<TypeId, ClassId>,
    by_token: FxHashMap<TypeHash, ClassId>,
}

impl Registry {
    fn record(&self, id: ClassId) -> Option<&ClassRecord> {
        self.records.get(id.index())
    }

    /// The record a walk over `native` starts from. A token whose class
    /// binds a different Rust type than the stored payload has none.
    fn start(&self, native: &NativeObject) -> Option<ClassId> {
        let id = self.by_token.get(&native.class_token()).copied()?;
        let record = self.record(id)?;
        (record.info.type_id == native.type_id()).then_some(id)
    }
}

/// All classes bound into one runtime.
///
/// Lives in the runtime's embedder data; see [`ClassRegistry::install`].
#[derive(Default)]
pub struct ClassRegistry {
    inner: RefCell<Registry>,
}

impl ClassRegistry {
    /// The runtime's registry, created on first use.
    pub fn install(rt: &mut Runtime) -> Rc<Self> {
        rt.embedder_data_or_insert_with(ClassRegistry::default)
    }

    pub fn get(rt: &Runtime) -> Option<Rc<Self>> {
        rt.embedder_data::<Self>()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind `T` as the class `name`.
    ///
    /// A Rust type is bound at most once, and a qualified name names at most
    /// one type.
    pub fn register<T: 'static>(
        &self,
        name: &str,
        constructor: ObjectId,
        prototype: ObjectId,
    ) -> Result<ClassInfo, RegistrationError> {
        let mut inner = self.inner.borrow_mut();
        let type_id = TypeId::of::<T>();
        let token = TypeHash::of_class(name);

        if let Some(existing) = inner.by_type.get(&type_id).and_then(|id| inner.record(*id)) {
            return Err(RegistrationError::TypeAlreadyBound {
                type_name: type_name::<T>(),
                existing: existing.info.name.clone(),
            });
        }
        if let Some(existing) = inner.by_token.get(&token).and_then(|id| inner.record(*id)) {
            return Err(RegistrationError::NameBoundToOtherType {
                name: name.to_string(),
                existing: existing.info.type_name,
            });
        }

        let id = ClassId(inner.records.len() as u32);
        let info = ClassInfo {
            id,
            name: name.to_string(),
            token,
            type_id,
            type_name: type_name::<T>(),
            parent: None,
            constructor,
            prototype,
        };
        inner.records.push(ClassRecord {
            info: info.clone(),
            upcast: None,
        });
        inner.by_type.insert(type_id, id);
        inner.by_token.insert(token, id);

        debug!(class = name, %token, rust_type = info.type_name, "class registered");
        Ok(info)
    }

    /// Record that `D`'s class derives from `B`'s class.
    pub fn link_parent<D: Inherits<B>, B: 'static>(&self) -> Result<(), RegistrationError> {
        let mut inner = self.inner.borrow_mut();
        let parent = *inner
            .by_type
            .get(&TypeId::of::<B>())
            .ok_or(RegistrationError::UnboundSuperClass {
                type_name: type_name::<B>(),
            })?;
        let child = *inner
            .by_type
            .get(&TypeId::of::<D>())
            .ok_or(BindError::UnboundType {
                type_name: type_name::<D>(),
            })
            .map_err(|source| RegistrationError::Value {
                name: type_name::<D>().to_string(),
                source,
            })?;

        let record = &mut inner.records[child.index()];
        record.info.parent = Some(parent);
        record.upcast = Some(upcast_erased::<D, B>);
        debug!(
            class = %record.info.name,
            parent = type_name::<B>(),
            "class linked to super class"
        );
        Ok(())
    }

    pub fn class_of<T: 'static>(&self) -> Option<ClassInfo> {
        self.class_by_type(TypeId::of::<T>())
    }

    pub fn class_by_type(&self, type_id: TypeId) -> Option<ClassInfo> {
        let inner = self.inner.borrow();
        let id = inner.by_type.get(&type_id)?;
        inner.record(*id).map(|r| r.info.clone())
    }

    pub fn class_by_token(&self, token: TypeHash) -> Option<ClassInfo> {
        let inner = self.inner.borrow();
        let id = inner.by_token.get(&token)?;
        inner.record(*id).map(|r| r.info.clone())
    }

    pub fn info(&self, id: ClassId) -> Option<ClassInfo> {
        self.inner.borrow().record(id).map(|r| r.info.clone())
    }

    /// Whether `ancestor` is `derived` itself or one of its super classes.
    pub fn is_ancestor_or_self(&self, derived: TypeId, ancestor: TypeId) -> bool {
        let inner = self.inner.borrow();
        let mut cursor = inner.by_type.get(&derived).copied();
        while let Some(id) = cursor {
            let Some(record) = inner.record(id) else {
                return false;
            };
            if record.info.type_id == ancestor {
                return true;
            }
            cursor = record.info.parent;
        }
        false
    }

    /// Class test without touching the object's memory.
    pub fn is_a<T: 'static>(&self, native: &NativeObject, mode: Match) -> bool {
        let inner = self.inner.borrow();
        let target = TypeId::of::<T>();
        let mut cursor = inner.start(native);
        while let Some(id) = cursor {
            let Some(record) = inner.record(id) else {
                return false;
            };
            if record.info.type_id == target {
                return true;
            }
            if mode == Match::Exact {
                return false;
            }
            cursor = record.info.parent;
        }
        false
    }

    /// Pointer to the `T` inside `native`, walking super classes unless
    /// `mode` is [`Match::Exact`].
    pub fn resolve<T: 'static>(
        &self,
        native: &NativeObject,
        mode: Match,
    ) -> Result<NonNull<T>, BindError> {
        let inner = self.inner.borrow();
        let target = TypeId::of::<T>();
        let mut ptr = native.raw_ptr().as_ptr();
        let mut cursor = inner.start(native);

        while let Some(id) = cursor {
            let Some(record) = inner.record(id) else {
                break;
            };
            if record.info.type_id == target {
                return NonNull::new(ptr.cast::<T>()).ok_or(BindError::MissingObject);
            }
            if mode == Match::Exact {
                break;
            }
            match (record.info.parent, record.upcast) {
                (Some(parent), Some(upcast)) => {
                    // SAFETY: ptr addresses the value of `record`'s type, and the
                    // thunk was registered for exactly that type and its parent.
                    ptr = unsafe { upcast(ptr) };
                    cursor = Some(parent);
                }
                _ => break,
            }
        }

        let expected = inner
            .by_type
            .get(&target)
            .and_then(|id| inner.record(*id))
            .map(|r| r.info.name.clone())
            .unwrap_or_else(|| type_name::<T>().to_string());
        Err(BindError::WrongType { expected })
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_list()
            .entries(inner.records.iter().map(|r| &r.info.name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjMut, ObjRef, Shared, exact_type_of, is_a, wrap_shared, wrap_value};
    use crate::value::Value;

    #[derive(Debug)]
    struct A {
        a: i32,
    }
    #[derive(Debug)]
    struct B {
        base: A,
        b: i32,
    }
    #[derive(Debug)]
    struct C {
        pad: [u64; 3],
        base: B,
        c: i32,
    }
    struct Unrelated;

    crate::inherits!(B: A => base);
    crate::inherits!(C: B => base);

    fn bind_chain(rt: &mut Runtime) -> Rc<ClassRegistry> {
        let classes = ClassRegistry::install(rt);
        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            let ctor = rt.new_object();
            let proto = rt.new_object();
            match i {
                0 => classes.register::<A>(name, ctor, proto).unwrap(),
                1 => classes.register::<B>(name, ctor, proto).unwrap(),
                _ => classes.register::<C>(name, ctor, proto).unwrap(),
            };
        }
        classes.link_parent::<B, A>().unwrap();
        classes.link_parent::<C, B>().unwrap();
        classes
    }

    fn make_c() -> C {
        C {
            pad: [9; 3],
            base: B {
                base: A { a: 1 },
                b: 2,
            },
            c: 3,
        }
    }

    #[test]
    fn derived_object_passes_every_ancestor_check() {
        let mut rt = Runtime::new();
        bind_chain(&mut rt);
        let c = wrap_value(&mut rt, make_c()).unwrap();

        assert!(is_a::<A>(&rt, &c));
        assert!(is_a::<B>(&rt, &c));
        assert!(is_a::<C>(&rt, &c));
        assert!(exact_type_of::<C>(&rt, &c));
        assert!(!exact_type_of::<B>(&rt, &c));
        assert!(!is_a::<Unrelated>(&rt, &c));
    }

    #[test]
    fn resolve_applies_upcasts() {
        let mut rt = Runtime::new();
        bind_chain(&mut rt);
        let c = wrap_value(&mut rt, make_c()).unwrap();

        let as_c = ObjRef::<C>::from_value(&rt, &c).unwrap();
        assert_eq!(as_c.pad, [9; 3]);
        assert_eq!(as_c.c, 3);
        drop(as_c);
        assert_eq!(ObjRef::<B>::from_value(&rt, &c).unwrap().b, 2);
        assert_eq!(ObjRef::<A>::from_value(&rt, &c).unwrap().a, 1);
    }

    #[test]
    fn mutation_through_base_is_visible_in_derived() {
        let mut rt = Runtime::new();
        bind_chain(&mut rt);
        let c = wrap_value(&mut rt, make_c()).unwrap();
        ObjMut::<A>::from_value(&rt, &c).unwrap().a = 40;
        assert_eq!(ObjRef::<C>::from_value(&rt, &c).unwrap().base.base.a, 40);
    }

    #[test]
    fn base_object_is_not_derived() {
        let mut rt = Runtime::new();
        bind_chain(&mut rt);
        let a = wrap_value(&mut rt, A { a: 5 }).unwrap();
        let err = ObjRef::<C>::from_value(&rt, &a).unwrap_err();
        assert_eq!(err.to_string(), "expected native object of type C");
        assert!(ObjRef::<A>::exact(&rt, &a).is_ok());
    }

    #[test]
    fn payload_of_another_type_is_rejected() {
        let mut rt = Runtime::new();
        bind_chain(&mut rt);
        let id = rt.new_object();
        let forged = NativeObject::by_value(TypeHash::of_class("C"), 1u8).unwrap();
        crate::object::attach(&mut rt, id, forged).unwrap();
        let value = Value::Object(id);

        assert!(!is_a::<C>(&rt, &value));
        assert!(!is_a::<A>(&rt, &value));
        assert!(!exact_type_of::<C>(&rt, &value));
        assert!(matches!(
            ObjRef::<C>::from_value(&rt, &value),
            Err(BindError::WrongType { .. })
        ));
        assert!(matches!(
            ObjMut::<A>::from_value(&rt, &value),
            Err(BindError::WrongType { .. })
        ));
    }

    #[test]
    fn exact_rejects_ancestor_access() {
        let mut rt = Runtime::new();
        bind_chain(&mut rt);
        let c = wrap_value(&mut rt, make_c()).unwrap();
        assert!(matches!(
            ObjRef::<B>::exact(&rt, &c),
            Err(BindError::WrongType { .. })
        ));
    }

    #[test]
    fn non_objects_are_missing() {
        let mut rt = Runtime::new();
        bind_chain(&mut rt);
        let plain = Value::Object(rt.new_object());
        for value in [Value::Int(1), Value::Undefined, plain] {
            assert_eq!(
                ObjRef::<A>::from_value(&rt, &value).unwrap_err(),
                BindError::MissingObject
            );
        }
    }

    #[test]
    fn conflicting_borrows_fail() {
        let mut rt = Runtime::new();
        bind_chain(&mut rt);
        let c = wrap_value(&mut rt, make_c()).unwrap();
        let writer = ObjMut::<C>::from_value(&rt, &c).unwrap();
        assert!(matches!(
            ObjRef::<A>::from_value(&rt, &c),
            Err(BindError::AlreadyBorrowed { .. })
        ));
        drop(writer);
        assert!(ObjRef::<A>::from_value(&rt, &c).is_ok());
    }

    #[test]
    fn shared_objects_resolve_through_the_chain() {
        let mut rt = Runtime::new();
        bind_chain(&mut rt);
        let shared = Shared::new(make_c());
        let value = wrap_shared(&mut rt, shared.clone()).unwrap();
        ObjMut::<B>::from_value(&rt, &value).unwrap().b = 20;
        assert_eq!(shared.borrow().base.b, 20);
    }

    #[test]
    fn type_bound_twice_is_rejected() {
        let mut rt = Runtime::new();
        let classes = bind_chain(&mut rt);
        let (ctor, proto) = (rt.new_object(), rt.new_object());
        let err = classes.register::<A>("Again", ctor, proto).unwrap_err();
        assert!(matches!(err, RegistrationError::TypeAlreadyBound { .. }));
        let err = classes.register::<Unrelated>("A", ctor, proto).unwrap_err();
        assert!(matches!(err, RegistrationError::NameBoundToOtherType { .. }));
    }

    #[test]
    fn ancestry_queries() {
        let mut rt = Runtime::new();
        let classes = bind_chain(&mut rt);
        let (a, c) = (TypeId::of::<A>(), TypeId::of::<C>());
        assert!(classes.is_ancestor_or_self(c, a));
        assert!(classes.is_ancestor_or_self(a, a));
        assert!(!classes.is_ancestor_or_self(a, c));
        assert_eq!(classes.len(), 3);
        let info = classes.class_of::<C>().unwrap();
        assert_eq!(classes.class_by_token(info.token).unwrap().name, "C");
        assert_eq!(classes.info(info.parent.unwrap()).unwrap().name, "B");
    }

    #[test]
    fn unbound_super_class() {
        let mut rt = Runtime::new();
        let classes = ClassRegistry::install(&mut rt);
        let (ctor, proto) = (rt.new_object(), rt.new_object());
        classes.register::<B>("B", ctor, proto).unwrap();
        assert!(matches!(
            classes.link_parent::<B, A>(),
            Err(RegistrationError::UnboundSuperClass { .. })
        ));
    }
}

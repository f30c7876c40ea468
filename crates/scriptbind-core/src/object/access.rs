//! Typed access to wrapped native objects.

use std::any::{Any, type_name};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::rc::Rc;

use super::borrow::{BorrowFlag, BorrowGuard};
use super::native::NativeObject;
use super::shared::Shared;
use crate::class::{ClassRegistry, Match};
use crate::error::BindError;
use crate::runtime::Runtime;
use crate::value::Value;

/// The native object behind a runtime value.
///
/// Fails with `MissingObject` when the value is not an object, the object is
/// gone, or its internal slot is empty.
pub fn native_of(rt: &Runtime, value: &Value) -> Result<Rc<NativeObject>, BindError> {
    value
        .as_object()
        .and_then(|id| rt.native(id))
        .ok_or(BindError::MissingObject)
}

/// Whether `value` wraps a `T` or a class derived from `T`'s class.
pub fn is_a<T: 'static>(rt: &Runtime, value: &Value) -> bool {
    matches_class::<T>(rt, value, Match::Derived)
}

/// Whether `value` wraps exactly `T`'s class.
pub fn exact_type_of<T: 'static>(rt: &Runtime, value: &Value) -> bool {
    matches_class::<T>(rt, value, Match::Exact)
}

fn matches_class<T: 'static>(rt: &Runtime, value: &Value, mode: Match) -> bool {
    let (Ok(native), Some(classes)) = (native_of(rt, value), ClassRegistry::get(rt)) else {
        return false;
    };
    classes.is_a::<T>(&native, mode)
}

/// Another owner of a shared-ownership object.
pub fn shared_of<T: 'static>(rt: &Runtime, value: &Value) -> Result<Shared<T>, BindError> {
    native_of(rt, value)?.shared::<T>()
}

fn locate<T: 'static>(
    rt: &Runtime,
    value: &Value,
    mode: Match,
) -> Result<(Rc<NativeObject>, NonNull<T>), BindError> {
    let native = native_of(rt, value)?;
    let classes = ClassRegistry::get(rt).ok_or(BindError::UnboundType {
        type_name: type_name::<T>(),
    })?;
    let ptr = classes.resolve::<T>(&native, mode)?;
    Ok((native, ptr))
}

/// Shared access to a wrapped `T` (or the `T` part of a derived object).
pub struct ObjRef<T: 'static> {
    ptr: NonNull<T>,
    _guard: BorrowGuard,
    native: Rc<NativeObject>,
}

impl<T: 'static> ObjRef<T> {
    pub fn from_value(rt: &Runtime, value: &Value) -> Result<Self, BindError> {
        Self::locate(rt, value, Match::Derived)
    }

    /// Like [`ObjRef::from_value`] but rejects derived classes.
    pub fn exact(rt: &Runtime, value: &Value) -> Result<Self, BindError> {
        Self::locate(rt, value, Match::Exact)
    }

    fn locate(rt: &Runtime, value: &Value, mode: Match) -> Result<Self, BindError> {
        let (native, ptr) = locate::<T>(rt, value, mode)?;
        let guard = native
            .borrow_flag()
            .try_shared()
            .ok_or(BindError::AlreadyBorrowed {
                type_name: native.type_name(),
            })?;
        Ok(Self {
            ptr,
            _guard: guard,
            native,
        })
    }

    pub fn native(&self) -> &Rc<NativeObject> {
        &self.native
    }

    pub fn as_ptr(&self) -> NonNull<T> {
        self.ptr
    }
}

impl<T: 'static> Deref for ObjRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the shared guard is held for our lifetime and the native
        // handle keeps the storage alive.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ObjRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjRef").field(&**self).finish()
    }
}

/// Exclusive access to a wrapped `T`.
pub struct ObjMut<T: 'static> {
    ptr: NonNull<T>,
    _guard: BorrowGuard,
    native: Rc<NativeObject>,
}

impl<T: 'static> ObjMut<T> {
    pub fn from_value(rt: &Runtime, value: &Value) -> Result<Self, BindError> {
        Self::locate(rt, value, Match::Derived)
    }

    pub fn exact(rt: &Runtime, value: &Value) -> Result<Self, BindError> {
        Self::locate(rt, value, Match::Exact)
    }

    fn locate(rt: &Runtime, value: &Value, mode: Match) -> Result<Self, BindError> {
        let (native, ptr) = locate::<T>(rt, value, mode)?;
        let guard = native
            .borrow_flag()
            .try_exclusive()
            .ok_or(BindError::AlreadyBorrowed {
                type_name: native.type_name(),
            })?;
        Ok(Self {
            ptr,
            _guard: guard,
            native,
        })
    }

    pub fn native(&self) -> &Rc<NativeObject> {
        &self.native
    }

    pub fn as_ptr(&self) -> NonNull<T> {
        self.ptr
    }
}

impl<T: 'static> Deref for ObjMut<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the exclusive guard is held for our lifetime.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: 'static> DerefMut for ObjMut<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the exclusive guard is held for our lifetime.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ObjMut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjMut").field(&**self).finish()
    }
}

/// A non-owning reference to native memory, wrapped by raw pointer.
///
/// Returning an `Alias<T>` from a bound function hands the script an object
/// that reads and writes the native value in place and never destroys it.
pub struct Alias<T: 'static> {
    ptr: NonNull<T>,
    keepalive: Option<Rc<dyn Any>>,
    flag: BorrowFlag,
}

impl<T: 'static> Alias<T> {
    /// Alias arbitrary memory.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for as long as any script object wraps it, and
    /// native code must not hold references to it while script calls run.
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Self {
            ptr,
            keepalive: None,
            flag: BorrowFlag::new(),
        }
    }

    /// Alias memory kept alive by `owner` and guarded by `flag`.
    ///
    /// # Safety
    ///
    /// `ptr` must point into memory owned by `owner` and `flag` must be the
    /// borrow flag guarding that memory.
    pub unsafe fn with_owner(ptr: NonNull<T>, owner: Rc<dyn Any>, flag: BorrowFlag) -> Self {
        Self {
            ptr,
            keepalive: Some(owner),
            flag,
        }
    }

    /// Alias the value inside a shared handle, keeping the handle alive.
    pub fn of_shared(shared: &Shared<T>) -> Self {
        Self {
            ptr: shared.as_ptr(),
            keepalive: Some(shared.clone().into_any()),
            flag: shared.flag().clone(),
        }
    }

    pub(crate) fn into_parts(self) -> (NonNull<T>, Option<Rc<dyn Any>>, BorrowFlag) {
        (self.ptr, self.keepalive, self.flag)
    }
}

impl<T: 'static> fmt::Debug for Alias<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alias")
            .field("type", &type_name::<T>())
            .field("owned", &self.keepalive.is_some())
            .finish()
    }
}

//! Reference-counted ownership shared between native code and scripts.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::rc::Rc;

use super::borrow::{BorrowFlag, BorrowGuard};
use crate::error::BindError;

type Deleter<T> = Box<dyn FnOnce(Box<T>)>;

struct SharedBox<T: 'static> {
    ptr: NonNull<T>,
    flag: BorrowFlag,
    deleter: Cell<Option<Deleter<T>>>,
}

impl<T: 'static> Drop for SharedBox<T> {
    fn drop(&mut self) {
        // SAFETY: ptr came from Box::into_raw and this is the last owner.
        let boxed = unsafe { Box::from_raw(self.ptr.as_ptr()) };
        match self.deleter.take() {
            Some(deleter) => deleter(boxed),
            None => drop(boxed),
        }
    }
}

/// A heap value owned jointly by native code and any number of script objects.
///
/// Borrows go through the same [`BorrowFlag`] the dispatcher uses, so native
/// code and script calls cannot alias a mutable borrow.
pub struct Shared<T: 'static> {
    inner: Rc<SharedBox<T>>,
}

impl<T: 'static> Shared<T> {
    pub fn new(value: T) -> Self {
        Self::adopt(Box::new(value), None)
    }

    /// Adopt a boxed value, destroying it with `deleter` when the last owner goes away.
    pub fn with_deleter(value: Box<T>, deleter: impl FnOnce(Box<T>) + 'static) -> Self {
        Self::adopt(value, Some(Box::new(deleter)))
    }

    fn adopt(value: Box<T>, deleter: Option<Deleter<T>>) -> Self {
        let ptr = NonNull::from(Box::leak(value));
        Self {
            inner: Rc::new(SharedBox {
                ptr,
                flag: BorrowFlag::new(),
                deleter: Cell::new(deleter),
            }),
        }
    }

    pub fn try_borrow(&self) -> Result<SharedRef<'_, T>, BindError> {
        let guard = self.inner.flag.try_shared().ok_or(BindError::AlreadyBorrowed {
            type_name: std::any::type_name::<T>(),
        })?;
        // SAFETY: the shared guard excludes exclusive borrows.
        let value = unsafe { self.inner.ptr.as_ref() };
        Ok(SharedRef {
            value,
            _guard: guard,
        })
    }

    pub fn try_borrow_mut(&self) -> Result<SharedMut<'_, T>, BindError> {
        let guard = self
            .inner
            .flag
            .try_exclusive()
            .ok_or(BindError::AlreadyBorrowed {
                type_name: std::any::type_name::<T>(),
            })?;
        // SAFETY: the exclusive guard excludes every other borrow.
        let value = unsafe { &mut *self.inner.ptr.as_ptr() };
        Ok(SharedMut {
            value,
            _guard: guard,
        })
    }

    /// # Panics
    ///
    /// Panics if the value is mutably borrowed, like `RefCell::borrow`.
    pub fn borrow(&self) -> SharedRef<'_, T> {
        match self.try_borrow() {
            Ok(r) => r,
            Err(err) => panic!("{err}"),
        }
    }

    /// # Panics
    ///
    /// Panics if the value is borrowed at all, like `RefCell::borrow_mut`.
    pub fn borrow_mut(&self) -> SharedMut<'_, T> {
        match self.try_borrow_mut() {
            Ok(r) => r,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn strong_count(this: &Self) -> usize {
        Rc::strong_count(&this.inner)
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.inner, &other.inner)
    }

    pub(crate) fn as_ptr(&self) -> NonNull<T> {
        self.inner.ptr
    }

    pub(crate) fn flag(&self) -> &BorrowFlag {
        &self.inner.flag
    }

    pub(crate) fn into_any(self) -> Rc<dyn Any> {
        self.inner
    }

    pub(crate) fn from_any(owner: &Rc<dyn Any>) -> Option<Self> {
        owner
            .clone()
            .downcast::<SharedBox<T>>()
            .ok()
            .map(|inner| Self { inner })
    }
}

impl<T: 'static> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_borrow() {
            Ok(value) => f.debug_tuple("Shared").field(&*value).finish(),
            Err(_) => f.write_str("Shared(<borrowed>)"),
        }
    }
}

pub struct SharedRef<'a, T> {
    value: &'a T,
    _guard: BorrowGuard,
}

impl<T> Deref for SharedRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

pub struct SharedMut<'a, T> {
    value: &'a mut T,
    _guard: BorrowGuard,
}

impl<T> Deref for SharedMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T> DerefMut for SharedMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrow_and_mutate() {
        let shared = Shared::new(5);
        *shared.borrow_mut() += 1;
        assert_eq!(*shared.borrow(), 6);
    }

    #[test]
    fn conflicting_borrow_is_an_error() {
        let shared = Shared::new(String::from("x"));
        let _read = shared.borrow();
        assert!(matches!(
            shared.try_borrow_mut(),
            Err(BindError::AlreadyBorrowed { .. })
        ));
        assert!(shared.try_borrow().is_ok());
    }

    #[test]
    fn deleter_runs_on_last_drop() {
        let deleted = Rc::new(Cell::new(None));
        let seen = deleted.clone();
        let shared = Shared::with_deleter(Box::new(42), move |boxed: Box<i32>| seen.set(Some(*boxed)));
        let second = shared.clone();
        assert_eq!(Shared::strong_count(&shared), 2);
        drop(shared);
        assert_eq!(deleted.get(), None);
        drop(second);
        assert_eq!(deleted.get(), Some(42));
    }

    #[test]
    fn round_trips_through_any() {
        let shared = Shared::new(1u8);
        let owner = shared.clone().into_any();
        let back = Shared::<u8>::from_any(&owner).unwrap();
        assert!(Shared::ptr_eq(&shared, &back));
        assert!(Shared::<u16>::from_any(&owner).is_none());
    }
}

//! Field projections for instance variables.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// A projection from a `T` to one of its (possibly nested) fields of type `V`.
///
/// Built with the [`field!`](crate::field) macro.
pub struct Field<T, V> {
    project: fn(*mut T) -> *mut V,
    _marker: PhantomData<fn(T) -> V>,
}

impl<T, V> Field<T, V> {
    /// # Safety
    ///
    /// `project` must return a pointer to a field inside the `T` it is given,
    /// without reading through the pointer.
    pub const unsafe fn new(project: fn(*mut T) -> *mut V) -> Self {
        Self {
            project,
            _marker: PhantomData,
        }
    }

    pub fn get<'a>(&self, object: &'a T) -> &'a V {
        let ptr = (self.project)((object as *const T).cast_mut());
        // SAFETY: the projection stays inside `object`, which is borrowed for 'a.
        unsafe { &*ptr }
    }

    pub fn get_mut<'a>(&self, object: &'a mut T) -> &'a mut V {
        let ptr = (self.project)(object);
        // SAFETY: the projection stays inside `object`, which is exclusively
        // borrowed for 'a.
        unsafe { &mut *ptr }
    }

    pub(crate) fn project(&self, base: NonNull<T>) -> NonNull<V> {
        let ptr = (self.project)(base.as_ptr());
        // SAFETY: a field of a non-null object is non-null.
        unsafe { NonNull::new_unchecked(ptr) }
    }
}

impl<T, V> Clone for Field<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Field<T, V> {}

impl<T, V> fmt::Debug for Field<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("object", &std::any::type_name::<T>())
            .field("field", &std::any::type_name::<V>())
            .finish()
    }
}

/// Projection to a field of a bound type.
///
/// ```
/// use scriptbind::field;
///
/// struct Inner { depth: u32 }
/// struct Outer { inner: Inner }
///
/// let depth = field!(Outer, inner.depth);
/// let outer = Outer { inner: Inner { depth: 3 } };
/// assert_eq!(*depth.get(&outer), 3);
/// ```
#[macro_export]
macro_rules! field {
    ($ty:ty, $($name:ident).+) => {{
        let project = |ptr: *mut $ty| unsafe { &raw mut (*ptr).$($name).+ };
        // SAFETY: the projection only computes the address of a field.
        unsafe { $crate::Field::<$ty, _>::new(project) }
    }};
}

#[cfg(test)]
mod tests {
    struct Pair {
        left: i32,
        right: (u8, u8),
    }

    #[test]
    fn reads_and_writes() {
        let left = crate::field!(Pair, left);
        let mut pair = Pair {
            left: 1,
            right: (2, 3),
        };
        *left.get_mut(&mut pair) += 10;
        assert_eq!(*left.get(&pair), 11);
        assert_eq!(pair.right, (2, 3));
    }

    #[test]
    fn projects_compound_fields() {
        let right = crate::field!(Pair, right);
        let pair = Pair {
            left: 0,
            right: (4, 5),
        };
        assert_eq!(right.get(&pair).1, 5);
    }
}

//! Storage strategies for wrapped native values.

use std::alloc::{self, Layout, LayoutError};
use std::any::Any;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

/// Base alignment requested from the allocator for by-value storage.
/// Stricter alignments are reached by padding inside the allocation.
pub const BASE_ALIGN: usize = align_of::<u64>();

/// How a native object holds its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Embedded in memory owned by the wrapper.
    Value,
    /// A raw address the wrapper never destroys.
    Pointer,
    /// One strong count of a [`Shared`](super::Shared) handle.
    Shared,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Value => write!(f, "by value"),
            StorageKind::Pointer => write!(f, "by raw pointer"),
            StorageKind::Shared => write!(f, "by shared ownership"),
        }
    }
}

/// Owned, aligned storage for one value of an erased type.
///
/// The allocation uses at most [`BASE_ALIGN`]; for types that need more,
/// `align - BASE_ALIGN` bytes of slack are added and the value is placed
/// at the first suitably aligned offset.
pub struct ValueCell {
    base: NonNull<u8>,
    layout: Layout,
    offset: usize,
    drop_value: unsafe fn(*mut u8),
}

unsafe fn drop_value<T>(ptr: *mut u8) {
    unsafe { std::ptr::drop_in_place(ptr.cast::<T>()) }
}

impl ValueCell {
    pub fn new<T: 'static>(value: T) -> Result<Self, LayoutError> {
        let align = align_of::<T>();
        let base_align = align.min(BASE_ALIGN);
        let padding = align - base_align;
        let layout = Layout::from_size_align(size_of::<T>() + padding, base_align)?;

        let (base, offset) = if layout.size() == 0 {
            (NonNull::<T>::dangling().cast::<u8>(), 0)
        } else {
            // SAFETY: layout has a non-zero size.
            let raw = unsafe { alloc::alloc(layout) };
            let Some(base) = NonNull::new(raw) else {
                alloc::handle_alloc_error(layout)
            };
            let misalignment = raw.addr() % align;
            let offset = if misalignment == 0 { 0 } else { align - misalignment };
            (base, offset)
        };
        debug_assert!(offset <= padding);

        // SAFETY: base + offset is aligned for T and has size_of::<T>() bytes
        // left inside the allocation.
        unsafe { base.as_ptr().add(offset).cast::<T>().write(value) };

        Ok(Self {
            base,
            layout,
            offset,
            drop_value: drop_value::<T>,
        })
    }

    /// Address of the stored value.
    pub fn as_ptr(&self) -> *mut u8 {
        // SAFETY: offset stays inside the allocation (or is 0 for zero-sized layouts).
        unsafe { self.base.as_ptr().add(self.offset) }
    }

    /// Padding bytes in front of the value.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes allocated, padding included.
    pub fn footprint(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for ValueCell {
    fn drop(&mut self) {
        // SAFETY: the value was written in `new` and is dropped exactly once.
        unsafe { (self.drop_value)(self.as_ptr()) };
        if self.layout.size() != 0 {
            // SAFETY: allocated in `new` with this layout.
            unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
        }
    }
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("size", &self.layout.size())
            .field("offset", &self.offset)
            .finish()
    }
}

pub(crate) enum Storage {
    Value(ValueCell),
    Pointer {
        ptr: NonNull<u8>,
        keepalive: Option<Rc<dyn Any>>,
    },
    Shared {
        ptr: NonNull<u8>,
        owner: Rc<dyn Any>,
        footprint: usize,
    },
}

impl Storage {
    pub(crate) fn kind(&self) -> StorageKind {
        match self {
            Storage::Value(_) => StorageKind::Value,
            Storage::Pointer { .. } => StorageKind::Pointer,
            Storage::Shared { .. } => StorageKind::Shared,
        }
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        match self {
            Storage::Value(cell) => cell.as_ptr(),
            Storage::Pointer { ptr, .. } | Storage::Shared { ptr, .. } => ptr.as_ptr(),
        }
    }

    pub(crate) fn footprint(&self) -> usize {
        match self {
            Storage::Value(cell) => cell.footprint(),
            Storage::Pointer { .. } => 0,
            Storage::Shared { footprint, .. } => *footprint,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[repr(align(16))]
    struct Align16(#[allow(dead_code)] u8);

    #[repr(align(32))]
    struct Align32(#[allow(dead_code)] [u8; 3]);

    fn assert_aligned<T: 'static>(value: T) {
        let cell = ValueCell::new(value).unwrap();
        assert_eq!(cell.as_ptr().addr() % align_of::<T>(), 0);
        assert!(cell.offset() <= align_of::<T>().saturating_sub(BASE_ALIGN));
    }

    #[test]
    fn alignment_holds_for_every_size_class() {
        assert_aligned(1u8);
        assert_aligned(2u16);
        assert_aligned(4u32);
        assert_aligned(8u64);
        assert_aligned(Align16(1));
        assert_aligned(Align32([1, 2, 3]));
    }

    #[test]
    fn zero_sized_values() {
        #[derive(Debug)]
        struct Empty;
        let cell = ValueCell::new(Empty).unwrap();
        assert_eq!(cell.footprint(), 0);
        assert_eq!(cell.offset(), 0);
    }

    #[test]
    fn value_is_readable() {
        let cell = ValueCell::new(0xdead_beef_u64).unwrap();
        let read = unsafe { *cell.as_ptr().cast::<u64>() };
        assert_eq!(read, 0xdead_beef);
        assert_eq!(cell.footprint(), 8);
    }

    #[test]
    fn drop_runs_destructor_once() {
        struct Counted(Rc<Cell<u32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let cell = ValueCell::new(Counted(drops.clone())).unwrap();
        assert_eq!(drops.get(), 0);
        drop(cell);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn kind_names() {
        assert_eq!(StorageKind::Shared.to_string(), "by shared ownership");
        assert_eq!(StorageKind::Pointer.to_string(), "by raw pointer");
    }
}

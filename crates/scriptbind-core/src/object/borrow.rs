//! Dynamic borrow tracking shared between a native object and its aliases.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Borrow state: `0` free, `n > 0` shared borrows, `-1` exclusive.
///
/// Clones observe the same state, so an alias into a field and the object
/// that owns the field exclude each other.
#[derive(Clone, Default)]
pub struct BorrowFlag(Rc<Cell<isize>>);

impl BorrowFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_shared(&self) -> Option<BorrowGuard> {
        let state = self.0.get();
        if state < 0 {
            return None;
        }
        self.0.set(state + 1);
        Some(BorrowGuard {
            flag: self.clone(),
            exclusive: false,
        })
    }

    pub fn try_exclusive(&self) -> Option<BorrowGuard> {
        if self.0.get() != 0 {
            return None;
        }
        self.0.set(-1);
        Some(BorrowGuard {
            flag: self.clone(),
            exclusive: true,
        })
    }

    pub fn is_borrowed(&self) -> bool {
        self.0.get() != 0
    }

    pub fn is_exclusive(&self) -> bool {
        self.0.get() < 0
    }

    /// Whether both flags track the same memory.
    pub fn same_as(&self, other: &BorrowFlag) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for BorrowFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BorrowFlag").field(&self.0.get()).finish()
    }
}

/// Releases its borrow on drop.
#[derive(Debug)]
pub struct BorrowGuard {
    flag: BorrowFlag,
    exclusive: bool,
}

impl Drop for BorrowGuard {
    fn drop(&mut self) {
        let cell = &self.flag.0;
        if self.exclusive {
            cell.set(0);
        } else {
            cell.set(cell.get() - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_borrows_stack() {
        let flag = BorrowFlag::new();
        let a = flag.try_shared().unwrap();
        let b = flag.try_shared().unwrap();
        assert!(flag.try_exclusive().is_none());
        drop(a);
        drop(b);
        assert!(!flag.is_borrowed());
    }

    #[test]
    fn exclusive_blocks_everything() {
        let flag = BorrowFlag::new();
        let guard = flag.try_exclusive().unwrap();
        assert!(flag.is_exclusive());
        assert!(flag.try_shared().is_none());
        assert!(flag.try_exclusive().is_none());
        drop(guard);
        assert!(flag.try_exclusive().is_some());
    }

    #[test]
    fn clones_share_state() {
        let flag = BorrowFlag::new();
        let alias = flag.clone();
        let _guard = alias.try_exclusive().unwrap();
        assert!(flag.try_shared().is_none());
        assert!(flag.same_as(&alias));
        assert!(!flag.same_as(&BorrowFlag::new()));
    }
}

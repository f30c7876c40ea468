//! Native object identity and lifetime.
//!
//! Every wrapped native value lives in a [`NativeObject`] held by the
//! runtime object's internal slot. The handle records:
//!
//! - the identity token of the class the value was wrapped as
//! - how the value is stored ([`StorageKind`]): embedded by value, aliased
//!   through a raw pointer, or owned through a [`Shared`] handle
//! - a [`BorrowFlag`] that dispatch uses to hand out `&T`/`&mut T` safely
//!
//! Owning kinds register a finalizer with the runtime and report their
//! footprint as external memory; the finalizer empties the slot and reports
//! the matching negative adjustment exactly once.

mod access;
mod borrow;
mod native;
mod shared;
mod storage;
mod wrap;

pub use access::{Alias, ObjMut, ObjRef, exact_type_of, is_a, native_of, shared_of};
pub use borrow::{BorrowFlag, BorrowGuard};
pub use native::NativeObject;
pub use shared::{Shared, SharedMut, SharedRef};
pub use storage::{StorageKind, ValueCell};
pub use wrap::{attach, wrap_alias, wrap_shared, wrap_value};

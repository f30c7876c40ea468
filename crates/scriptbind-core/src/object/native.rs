use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use super::access::Alias;
use super::borrow::BorrowFlag;
use super::shared::Shared;
use super::storage::{Storage, StorageKind, ValueCell};
use crate::error::BindError;
use crate::type_hash::TypeHash;

/// The uniform handle stored in a runtime object's internal slot.
pub struct NativeObject {
    class: TypeHash,
    type_id: TypeId,
    type_name: &'static str,
    storage: Storage,
    flag: BorrowFlag,
}

impl NativeObject {
    /// Embed `value` in wrapper-owned, aligned memory.
    pub fn by_value<T: 'static>(class: TypeHash, value: T) -> Result<Self, BindError> {
        let cell = ValueCell::new(value).map_err(|_| BindError::Allocation {
            type_name: type_name::<T>(),
        })?;
        Ok(Self::with_storage::<T>(class, Storage::Value(cell), BorrowFlag::new()))
    }

    /// Hold one strong count of `shared`.
    pub fn by_shared<T: 'static>(class: TypeHash, shared: Shared<T>) -> Self {
        let ptr = shared.as_ptr().cast::<u8>();
        let flag = shared.flag().clone();
        let storage = Storage::Shared {
            ptr,
            owner: shared.into_any(),
            footprint: size_of::<T>(),
        };
        Self::with_storage::<T>(class, storage, flag)
    }

    /// Reference memory the wrapper never destroys.
    pub fn by_alias<T: 'static>(class: TypeHash, alias: Alias<T>) -> Self {
        let (ptr, keepalive, flag) = alias.into_parts();
        let storage = Storage::Pointer {
            ptr: ptr.cast::<u8>(),
            keepalive,
        };
        Self::with_storage::<T>(class, storage, flag)
    }

    fn with_storage<T: 'static>(class: TypeHash, storage: Storage, flag: BorrowFlag) -> Self {
        Self {
            class,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            storage,
            flag,
        }
    }

    /// Identity token of the class this object was wrapped as.
    pub fn class_token(&self) -> TypeHash {
        self.class
    }

    /// Rust type of the stored value.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// Whether finalizing this handle releases native memory.
    pub fn owns_memory(&self) -> bool {
        !matches!(self.storage, Storage::Pointer { .. })
    }

    /// Bytes reported as external memory while this handle lives.
    pub fn footprint(&self) -> usize {
        self.storage.footprint()
    }

    pub fn borrow_flag(&self) -> &BorrowFlag {
        &self.flag
    }

    /// By-value storage, for inspecting placement.
    pub fn value_cell(&self) -> Option<&ValueCell> {
        match &self.storage {
            Storage::Value(cell) => Some(cell),
            _ => None,
        }
    }

    pub(crate) fn raw_ptr(&self) -> NonNull<u8> {
        // SAFETY: every storage variant holds a non-null address.
        unsafe { NonNull::new_unchecked(self.storage.as_ptr()) }
    }

    /// Another owner of the shared value.
    ///
    /// Fails with `OwnershipMismatch` for by-value and raw-pointer objects and
    /// with `WrongType` when `T` is not exactly the stored type.
    pub fn shared<T: 'static>(&self) -> Result<Shared<T>, BindError> {
        let Storage::Shared { owner, .. } = &self.storage else {
            return Err(BindError::OwnershipMismatch {
                type_name: self.type_name,
                kind: self.kind(),
            });
        };
        Shared::from_any(owner).ok_or_else(|| BindError::WrongType {
            expected: type_name::<T>().to_string(),
        })
    }

    /// The shared owner or pointer keep-alive, type-erased.
    pub fn owner(&self) -> Option<Rc<dyn Any>> {
        match &self.storage {
            Storage::Shared { owner, .. } => Some(owner.clone()),
            Storage::Pointer { keepalive, .. } => keepalive.clone(),
            Storage::Value(_) => None,
        }
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("class", &self.class)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind())
            .field("flag", &self.flag)
            .finish()
    }
}

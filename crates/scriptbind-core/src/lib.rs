//! Core types for the scriptbind binding layer.
//!
//! This crate holds everything the binding surface builds on:
//!
//! - [`Value`]: the dynamic value model of the host runtime
//! - [`Runtime`]: a small single-threaded host with an object heap, prototype
//!   chains, native call handlers, finalizers and external memory accounting
//! - [`ToRuntime`] / [`FromRuntime`]: the type conversion registry
//! - [`NativeObject`]: the identity and lifetime model for wrapped native values
//! - [`ClassRegistry`]: bound classes, their identity tokens and ancestry
//! - Error types shared by every layer
//!
//! The root `scriptbind` crate adds argument marshaling, dispatch and the
//! registration builder on top of these.

pub mod class;
pub mod convert;
pub mod error;
pub mod object;
pub mod runtime;
pub mod type_hash;
pub mod value;

pub use class::{ClassId, ClassInfo, ClassRegistry, Inherits, Match};
pub use convert::{FromRuntime, ToRuntime};
pub use error::{BindError, ConversionError, RegistrationError, ScriptError};
pub use object::{
    Alias, BorrowFlag, NativeObject, ObjMut, ObjRef, Shared, SharedMut, SharedRef, StorageKind,
    ValueCell,
};
pub use runtime::{
    CallContext, Finalizer, GcStats, NativeCallable, NativeFn, ObjectId, Property, PropertyFlags, PropertyValue,
    Runtime, RuntimeOptions,
};
pub use type_hash::TypeHash;
pub use value::Value;

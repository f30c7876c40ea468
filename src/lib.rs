//! scriptbind: expose native Rust types, functions and class hierarchies to
//! an embedded scripting runtime.
//!
//! ```ignore
//! use scriptbind::prelude::*;
//!
//! #[derive(Clone)]
//! struct Point { x: i32, y: i32 }
//! native_class!(Point, clone);
//!
//! let mut rt = Runtime::new();
//! Binding::new(&mut rt)
//!     .begin_module("geometry")?
//!     .begin_class::<Point>("Point")?
//!     .add_constructor_with(args![required, defaulted(0, 1)], |x: i32, y: i32| Point { x, y })?
//!     .add_variable("x", field!(Point, x), true)?
//!     .add_variable("y", field!(Point, y), true)?
//!     .end_class()
//!     .end_module();
//! ```
//!
//! The crate is layered as:
//!
//! - [`args`]: argument slots (`required`, `optional`, `defaulted`, `output`,
//!   `reference`, ...) and how each one is filled from a runtime argument
//! - [`invoke`]: per-arity dispatch shims for functions, methods and
//!   constructors, and composition of output parameters into the result
//! - [`bind`]: the fluent module/class registration builder
//!
//! The host runtime, conversion traits and object model come from
//! `scriptbind-core` and are re-exported here.

pub mod args;
pub mod bind;
pub mod invoke;
mod native_class;

pub use args::{ArgSlot, ArgSpec, Direction, NativeParam, Out, ParamInfo, Rational};
pub use bind::{Binding, ClassBuilder, Field, ModuleBuilder, Root, Scope, describe};
pub use invoke::{NativeConstructor, NativeFunction, NativeMethod};

pub use scriptbind_core::object;
pub use scriptbind_core::{
    Alias, BindError, CallContext, ClassRegistry, ConversionError, FromRuntime, Inherits, NativeFn,
    NativeObject, ObjMut, ObjRef, ObjectId, PropertyFlags, RegistrationError, Runtime,
    RuntimeOptions, ScriptError, Shared, StorageKind, ToRuntime, TypeHash, Value, inherits,
};
pub use scriptbind_registry::MemberKind;

pub mod prelude {
    pub use crate::args::{ArgSlot, ArgSpec, NativeParam, Out};
    pub use crate::bind::{Binding, Field};
    pub use crate::object::{exact_type_of, is_a, shared_of};
    pub use crate::{args, field, inherits, native_class};
    pub use scriptbind_core::{
        Alias, BindError, FromRuntime, ObjMut, ObjRef, RegistrationError, Runtime, ScriptError,
        Shared, ToRuntime, Value,
    };
}

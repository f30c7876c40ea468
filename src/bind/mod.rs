//! The registration builder.
//!
//! Builders form a stack mirroring the scopes being populated: a [`Binding`]
//! opens modules, modules open classes, classes open nested classes. Each
//! `begin_*` consumes the current builder and each `end_*` hands the parent
//! back, so the chain reads top to bottom like the script namespace it
//! creates.
//!
//! Every installed member is frozen: scripts cannot overwrite or delete
//! it. Adding a name a second time replaces the earlier member and logs a
//! warning.

mod class;
mod field;
mod members;
mod module;
mod scope;

pub use class::ClassBuilder;
pub use field::Field;
pub use module::{Binding, ModuleBuilder, Root};
pub use scope::{Scope, describe};

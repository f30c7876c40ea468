//! Scope metadata for scriptbind.
//!
//! The registration builder records every module and class scope it opens,
//! and every member it installs, in a [`ScopeTree`]. The tree is what makes
//! reopening a scope idempotent across separate binding sessions, and what
//! [`members`](ScopeTree::members) introspection reads.

mod scope_tree;

pub use petgraph::graph::NodeIndex;
pub use scope_tree::{MemberKind, ScopeData, ScopeEdge, ScopeKind, ScopeTree};

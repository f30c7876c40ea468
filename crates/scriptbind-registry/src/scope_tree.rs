//! Scope Tree - hierarchical record of bound modules and classes.
//!
//! Uses `petgraph::DiGraph` with:
//! - Nodes: `ScopeData` (the scope's runtime object and its members)
//! - Edges: `Contains(name)` from a scope to each nested scope

use std::fmt;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use scriptbind_core::{ObjectId, TypeHash};

/// What a scope node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The global object.
    Root,
    Module,
    Class { token: TypeHash },
}

impl ScopeKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ScopeKind::Root => "global scope",
            ScopeKind::Module => "module",
            ScopeKind::Class { .. } => "class",
        }
    }
}

/// A member installed into a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Module,
    Class,
    Constructor,
    Factory,
    Function,
    Method,
    StaticFunction,
    Property { writable: bool },
    StaticProperty { writable: bool },
    Variable { writable: bool, by_ref: bool },
    StaticVariable { writable: bool, by_ref: bool },
    Constant,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MemberKind::Module => "module",
            MemberKind::Class => "class",
            MemberKind::Constructor => "constructor",
            MemberKind::Factory => "factory",
            MemberKind::Function => "function",
            MemberKind::Method => "method",
            MemberKind::StaticFunction => "static function",
            MemberKind::Property { writable: true } => "property",
            MemberKind::Property { writable: false } => "read-only property",
            MemberKind::StaticProperty { writable: true } => "static property",
            MemberKind::StaticProperty { writable: false } => "read-only static property",
            MemberKind::Variable { by_ref: true, .. } => "variable reference",
            MemberKind::Variable { by_ref: false, .. } => "variable",
            MemberKind::StaticVariable { by_ref: true, .. } => "static variable reference",
            MemberKind::StaticVariable { by_ref: false, .. } => "static variable",
            MemberKind::Constant => "constant",
        };
        f.write_str(text)
    }
}

/// Data stored in each scope node.
#[derive(Debug)]
pub struct ScopeData {
    pub kind: ScopeKind,
    /// The module object, or the class constructor.
    pub object: ObjectId,
    /// Prototype of class scopes.
    pub prototype: Option<ObjectId>,
    members: FxHashMap<String, MemberKind>,
}

impl ScopeData {
    pub fn new(kind: ScopeKind, object: ObjectId, prototype: Option<ObjectId>) -> Self {
        Self {
            kind,
            object,
            prototype,
            members: FxHashMap::default(),
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, ScopeKind::Class { .. })
    }

    pub fn member(&self, name: &str) -> Option<MemberKind> {
        self.members.get(name).copied()
    }
}

/// Edge types in the scope graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEdge {
    /// Parent scope contains child scope. The String is the child's simple name.
    Contains(String),
}

/// The scope graph.
pub struct ScopeTree {
    graph: DiGraph<ScopeData, ScopeEdge>,
    root: NodeIndex,
}

impl ScopeTree {
    /// A tree whose root is the runtime's global object.
    pub fn new(global: ObjectId) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(ScopeData::new(ScopeKind::Root, global, None));
        Self { graph, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn scope(&self, node: NodeIndex) -> Option<&ScopeData> {
        self.graph.node_weight(node)
    }

    pub fn scope_mut(&mut self, node: NodeIndex) -> Option<&mut ScopeData> {
        self.graph.node_weight_mut(node)
    }

    /// Number of scopes, the root included.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Find a nested scope by simple name.
    pub fn find_child(&self, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.graph.edges(parent).find_map(|edge| match edge.weight() {
            ScopeEdge::Contains(child) if child == name => Some(edge.target()),
            _ => None,
        })
    }

    /// Add a nested scope. Callers check [`find_child`](Self::find_child) first.
    pub fn add_child(&mut self, parent: NodeIndex, name: &str, data: ScopeData) -> NodeIndex {
        let member = if data.is_class() {
            MemberKind::Class
        } else {
            MemberKind::Module
        };
        let child = self.graph.add_node(data);
        self.graph
            .add_edge(parent, child, ScopeEdge::Contains(name.to_string()));
        self.record_member(parent, name, member);
        child
    }

    /// Nested scopes with their simple names, sorted by name.
    pub fn children(&self, parent: NodeIndex) -> Vec<(String, NodeIndex)> {
        let mut children: Vec<_> = self
            .graph
            .edges(parent)
            .map(|edge| {
                let ScopeEdge::Contains(name) = edge.weight();
                (name.clone(), edge.target())
            })
            .collect();
        children.sort();
        children
    }

    pub fn find_parent(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .edges_directed(node, Direction::Incoming)
            .next()
            .map(|edge| edge.source())
    }

    /// Simple name of a scope; `None` for the root.
    pub fn name_of(&self, node: NodeIndex) -> Option<&str> {
        self.graph
            .edges_directed(node, Direction::Incoming)
            .next()
            .map(|edge| {
                let ScopeEdge::Contains(name) = edge.weight();
                name.as_str()
            })
    }

    /// Path of simple names from the root to `node`.
    pub fn path_of(&self, node: NodeIndex) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = node;
        while let Some(name) = self.name_of(current) {
            path.push(name.to_string());
            match self.find_parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Dotted name of `simple_name` declared inside `scope`.
    pub fn qualified_name(&self, scope: NodeIndex, simple_name: &str) -> String {
        let path = self.path_of(scope);
        if path.is_empty() {
            simple_name.to_string()
        } else {
            format!("{}.{}", path.join("."), simple_name)
        }
    }

    /// Scope at a dotted path; the empty path is the root.
    pub fn resolve(&self, dotted: &str) -> Option<NodeIndex> {
        if dotted.is_empty() {
            return Some(self.root);
        }
        dotted
            .split('.')
            .try_fold(self.root, |node, segment| self.find_child(node, segment))
    }

    /// Record an installed member, returning what the name held before.
    pub fn record_member(&mut self, scope: NodeIndex, name: &str, kind: MemberKind) -> Option<MemberKind> {
        self.graph
            .node_weight_mut(scope)?
            .members
            .insert(name.to_string(), kind)
    }

    /// Members of a scope, sorted by name.
    pub fn members(&self, scope: NodeIndex) -> Vec<(String, MemberKind)> {
        let mut members: Vec<_> = self
            .graph
            .node_weight(scope)
            .map(|data| data.members.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.0.cmp(&b.0));
        members
    }
}

impl fmt::Debug for ScopeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeTree")
            .field("scopes", &self.graph.node_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptbind_core::Runtime;

    fn tree() -> (Runtime, ScopeTree) {
        let rt = Runtime::new();
        let tree = ScopeTree::new(rt.global());
        (rt, tree)
    }

    fn module(rt: &mut Runtime) -> ScopeData {
        ScopeData::new(ScopeKind::Module, rt.new_object(), None)
    }

    #[test]
    fn find_child_after_add() {
        let (mut rt, mut tree) = tree();
        let root = tree.root();
        let m = tree.add_child(root, "M", module(&mut rt));
        assert_eq!(tree.find_child(root, "M"), Some(m));
        assert_eq!(tree.find_child(root, "N"), None);
        assert_eq!(tree.find_parent(m), Some(root));
        assert_eq!(tree.scope(root).unwrap().member("M"), Some(MemberKind::Module));
    }

    #[test]
    fn qualified_names_are_dotted() {
        let (mut rt, mut tree) = tree();
        let root = tree.root();
        let a = tree.add_child(root, "a", module(&mut rt));
        let b = tree.add_child(a, "b", module(&mut rt));
        assert_eq!(tree.path_of(b), vec!["a", "b"]);
        assert_eq!(tree.qualified_name(b, "Point"), "a.b.Point");
        assert_eq!(tree.qualified_name(root, "Point"), "Point");
        assert_eq!(tree.resolve("a.b"), Some(b));
        assert_eq!(tree.resolve(""), Some(root));
        assert_eq!(tree.resolve("a.c"), None);
    }

    #[test]
    fn class_scopes_record_as_classes() {
        let (mut rt, mut tree) = tree();
        let root = tree.root();
        let data = ScopeData::new(
            ScopeKind::Class {
                token: TypeHash::of_class("P"),
            },
            rt.new_object(),
            Some(rt.new_object()),
        );
        tree.add_child(root, "P", data);
        assert_eq!(tree.members(root), vec![("P".to_string(), MemberKind::Class)]);
    }

    #[test]
    fn members_replace_and_sort() {
        let (mut rt, mut tree) = tree();
        let root = tree.root();
        let m = tree.add_child(root, "M", module(&mut rt));
        assert_eq!(tree.record_member(m, "z", MemberKind::Constant), None);
        tree.record_member(m, "a", MemberKind::Function);
        let previous = tree.record_member(m, "z", MemberKind::Function);
        assert_eq!(previous, Some(MemberKind::Constant));
        let names: Vec<_> = tree.members(m).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "z"]);
    }

    #[test]
    fn children_sorted() {
        let (mut rt, mut tree) = tree();
        let root = tree.root();
        tree.add_child(root, "b", module(&mut rt));
        tree.add_child(root, "a", module(&mut rt));
        let names: Vec<_> = tree.children(root).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn member_kind_display() {
        assert_eq!(MemberKind::Property { writable: false }.to_string(), "read-only property");
        assert_eq!(
            MemberKind::Variable {
                writable: true,
                by_ref: true
            }
            .to_string(),
            "variable reference"
        );
    }
}

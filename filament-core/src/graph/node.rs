//! Graph Nodes
//!
//! This module defines the uniform node record that lives in the dependency
//! graph. A single polymorphic [`Node`] represents sources, derivations,
//! effects, and plain ownership scopes; the fields a given kind does not use
//! simply stay empty.
//!
//! Observer links carry the observer's recompute generation (`run`) at the
//! time the read happened. A link is current only while that stamp matches
//! the observer's present generation; notification prunes the rest. This is
//! how dynamic dependencies work without materialising the reverse
//! (dependency) direction.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A writable source (signal). Sources are roots of the data flow:
    /// they have observers but no compute body and are never dirty.
    Source,

    /// A derived value (memo). Has a compute body, caches its value, and
    /// recomputes lazily when read while dirty.
    Derived,

    /// An effect. A derivation whose value is unused; its body is run for
    /// side effects on every invalidation.
    Effect,

    /// A pure ownership scope with no reactive behavior of its own.
    /// Created by `root` and used to carry context and cleanups.
    Scope,
}

/// Type-erased recompute hook installed by the typed primitives.
///
/// Returns whether the produced value differed from the previous one
/// according to the node's dirty comparator.
pub(crate) type UpdateFn = Rc<dyn Fn() -> Result<bool>>;

/// Scope-local error handler.
pub(crate) type ErrorHandler = Rc<dyn Fn(&Error)>;

/// A node in the dependency graph.
///
/// The graph is indexed by [`NodeId`]; nodes reference each other by ID only,
/// so the bidirectional observer/child web cannot form reference cycles.
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    name: Option<String>,

    /// True when the next read or flush must recompute.
    dirty: bool,

    /// Recompute generation. Incremented at the start of every tracked
    /// execution of this node's body.
    run: u64,

    /// Readers of this node, stamped with the reader's `run` at link time.
    /// At most one entry per observer.
    observers: Vec<(NodeId, u64)>,

    /// Nodes created under this node's tracked execution; owned.
    children: Vec<NodeId>,

    /// The node under whose tracked execution this node was created.
    scope: Option<NodeId>,

    /// Disposal callbacks keyed for early removal, run on invalidation and
    /// on disposal.
    cleanups: Vec<(u64, Box<dyn FnOnce()>)>,
    next_cleanup_key: u64,

    /// Type-erased recompute hook (derivations and effects only).
    update: Option<UpdateFn>,

    /// Hierarchical context bag.
    context: HashMap<String, Rc<dyn Any>>,

    /// Scope-local error handlers; cleared when the owning derivation
    /// re-runs.
    error_handlers: Vec<ErrorHandler>,
}

impl Node {
    /// Create a new node with the given kind. Derivations and effects start
    /// dirty so that their first execution happens unconditionally.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            name: None,
            dirty: matches!(kind, NodeKind::Derived | NodeKind::Effect),
            run: 0,
            observers: Vec::new(),
            children: Vec::new(),
            scope: None,
            cleanups: Vec::new(),
            next_cleanup_key: 0,
            update: None,
            context: HashMap::new(),
            error_handlers: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    /// Display label for trails and tracing: the configured name, or
    /// `node<raw id>`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("node{}", self.id.raw()),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn run(&self) -> u64 {
        self.run
    }

    /// Start a new tracked execution of this node's body.
    pub(crate) fn begin_run(&mut self) -> u64 {
        self.run += 1;
        self.run
    }

    /// Record that `observer` read this node during its generation `run`.
    /// Re-reads refresh the stamp rather than duplicating the link.
    pub(crate) fn observe(&mut self, observer: NodeId, run: u64) {
        match self.observers.iter_mut().find(|(id, _)| *id == observer) {
            Some(entry) => entry.1 = run,
            None => self.observers.push((observer, run)),
        }
    }

    pub(crate) fn observers(&self) -> &[(NodeId, u64)] {
        &self.observers
    }

    pub(crate) fn retain_observers(&mut self, mut keep: impl FnMut(NodeId) -> bool) {
        self.observers.retain(|(id, _)| keep(*id));
    }

    pub(crate) fn push_child(&mut self, child: NodeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: NodeId) {
        self.children.retain(|c| *c != child);
    }

    pub(crate) fn take_children(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.children)
    }

    pub fn scope(&self) -> Option<NodeId> {
        self.scope
    }

    pub(crate) fn set_scope(&mut self, scope: Option<NodeId>) {
        self.scope = scope;
    }

    /// Register a disposal callback; the returned key allows early removal.
    pub(crate) fn push_cleanup(&mut self, cleanup: Box<dyn FnOnce()>) -> u64 {
        let key = self.next_cleanup_key;
        self.next_cleanup_key += 1;
        self.cleanups.push((key, cleanup));
        key
    }

    pub(crate) fn remove_cleanup(&mut self, key: u64) -> Option<Box<dyn FnOnce()>> {
        let index = self.cleanups.iter().position(|(k, _)| *k == key)?;
        Some(self.cleanups.remove(index).1)
    }

    pub(crate) fn take_cleanups(&mut self) -> Vec<Box<dyn FnOnce()>> {
        std::mem::take(&mut self.cleanups)
            .into_iter()
            .map(|(_, f)| f)
            .collect()
    }

    pub(crate) fn set_update(&mut self, update: UpdateFn) {
        self.update = Some(update);
    }

    pub(crate) fn update_hook(&self) -> Option<UpdateFn> {
        self.update.clone()
    }

    pub(crate) fn context_set(&mut self, key: String, value: Rc<dyn Any>) {
        self.context.insert(key, value);
    }

    pub(crate) fn context_get(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.context.get(key).cloned()
    }

    pub(crate) fn push_error_handler(&mut self, handler: ErrorHandler) {
        self.error_handlers.push(handler);
    }

    pub(crate) fn error_handlers(&self) -> Vec<ErrorHandler> {
        self.error_handlers.clone()
    }

    pub(crate) fn clear_error_handlers(&mut self) {
        self.error_handlers.clear();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("dirty", &self.dirty)
            .field("run", &self.run)
            .field("observers", &self.observers.len())
            .field("children", &self.children.len())
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn source_node_starts_clean() {
        let node = Node::new(NodeKind::Source);
        assert_eq!(node.kind(), NodeKind::Source);
        assert!(!node.is_dirty());
    }

    #[test]
    fn derived_and_effect_nodes_start_dirty() {
        assert!(Node::new(NodeKind::Derived).is_dirty());
        assert!(Node::new(NodeKind::Effect).is_dirty());
        assert!(!Node::new(NodeKind::Scope).is_dirty());
    }

    #[test]
    fn observe_is_a_set_with_stamp_refresh() {
        let mut node = Node::new(NodeKind::Source);
        let reader = NodeId::new();

        node.observe(reader, 1);
        node.observe(reader, 2);

        assert_eq!(node.observers().len(), 1);
        assert_eq!(node.observers()[0], (reader, 2));
    }

    #[test]
    fn cleanup_keys_allow_early_removal() {
        let mut node = Node::new(NodeKind::Scope);

        let first = node.push_cleanup(Box::new(|| {}));
        let second = node.push_cleanup(Box::new(|| {}));
        assert_ne!(first, second);

        assert!(node.remove_cleanup(first).is_some());
        assert!(node.remove_cleanup(first).is_none());
        assert_eq!(node.take_cleanups().len(), 1);
    }

    #[test]
    fn children_are_a_set() {
        let mut node = Node::new(NodeKind::Scope);
        let child = NodeId::new();

        node.push_child(child);
        node.push_child(child);
        assert_eq!(node.take_children(), vec![child]);
        assert!(node.take_children().is_empty());
    }

    #[test]
    fn label_falls_back_to_raw_id() {
        let mut node = Node::new(NodeKind::Derived);
        assert_eq!(node.label(), format!("node{}", node.id().raw()));

        node.set_name(Some("total".to_string()));
        assert_eq!(node.label(), "total");
    }
}

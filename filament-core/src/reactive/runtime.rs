//! Reactive Runtime
//!
//! The runtime owns the node arena and implements the graph engine: node
//! creation under the current scope, read-time dependency registration,
//! write-time invalidation, pull-on-read recomputation, disposal, and the
//! error-handler walk.
//!
//! # How It Works
//!
//! 1. Creating a primitive inserts a [`Node`] into the arena and parents it
//!    under the current scope.
//!
//! 2. Reading a value while an observer is current links the observer into
//!    the value's observer set, stamped with the observer's recompute
//!    generation.
//!
//! 3. Writing a source (or recomputing a derivation to a changed value)
//!    notifies its observers: stale links are pruned, live ones are marked
//!    dirty and enqueued.
//!
//! 4. A dirty derivation reconciles when read (pull-on-read) or when the
//!    scheduler flush reaches it, whichever comes first.
//!
//! # Borrow Discipline
//!
//! The arena is a thread-local `RefCell`. Every operation borrows it only in
//! short windows and never across user code: bodies, cleanups, comparators,
//! and error handlers all run with the arena released, so they may freely
//! read, write, create, and dispose nodes.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::graph::{ErrorHandler, Node, NodeId, NodeKind, Scheduler, UpdateFn};

use super::context;

thread_local! {
    static NODES: RefCell<HashMap<NodeId, Node>> = RefCell::new(HashMap::new());
    static HOOKED: Cell<bool> = Cell::new(false);
}

/// Wire the scheduler to this runtime: install the node runner and the
/// post-flush trail reset. Idempotent; called before any enqueue can happen.
fn bootstrap() {
    HOOKED.with(|hooked| {
        if hooked.get() {
            return;
        }
        hooked.set(true);
        Scheduler.set_runner(Rc::new(flush_node));
        Scheduler.on_flush(context::reset_trail);
    });
}

fn with_node<R>(id: NodeId, f: impl FnOnce(&mut Node) -> R) -> Option<R> {
    NODES.with(|nodes| nodes.borrow_mut().get_mut(&id).map(f))
}

/// Create a node of `kind` under the current scope.
pub(crate) fn create(kind: NodeKind, name: Option<String>) -> NodeId {
    create_in(kind, name, context::current_scope())
}

/// Create a node with no scope parent, regardless of the current scope.
pub(crate) fn create_detached(kind: NodeKind, name: Option<String>) -> NodeId {
    create_in(kind, name, None)
}

fn create_in(kind: NodeKind, name: Option<String>, parent: Option<NodeId>) -> NodeId {
    bootstrap();
    let mut node = Node::new(kind);
    node.set_name(name);
    node.set_scope(parent);
    let id = node.id();
    NODES.with(|nodes| {
        let mut nodes = nodes.borrow_mut();
        if let Some(parent) = parent {
            if let Some(parent) = nodes.get_mut(&parent) {
                parent.push_child(id);
            }
        }
        nodes.insert(id, node);
    });
    id
}

/// Whether the node is still in the arena. Absence means disposed.
pub(crate) fn is_live(id: NodeId) -> bool {
    NODES.with(|nodes| nodes.borrow().contains_key(&id))
}

pub(crate) fn is_dirty(id: NodeId) -> bool {
    with_node(id, |node| node.is_dirty()).unwrap_or(false)
}

pub(crate) fn label_of(id: NodeId) -> String {
    with_node(id, |node| node.label()).unwrap_or_else(|| format!("node{}", id.raw()))
}

pub(crate) fn scope_parent(id: NodeId) -> Option<NodeId> {
    with_node(id, |node| node.scope()).flatten()
}

pub(crate) fn set_update(id: NodeId, update: UpdateFn) {
    with_node(id, |node| node.set_update(update));
}

pub(crate) fn add_cleanup(id: NodeId, cleanup: Box<dyn FnOnce()>) -> Option<u64> {
    with_node(id, |node| node.push_cleanup(cleanup))
}

pub(crate) fn remove_cleanup(id: NodeId, key: u64) -> Option<Box<dyn FnOnce()>> {
    with_node(id, |node| node.remove_cleanup(key)).flatten()
}

pub(crate) fn add_error_handler(id: NodeId, handler: ErrorHandler) {
    with_node(id, |node| node.push_error_handler(handler));
}

pub(crate) fn context_set(id: NodeId, key: String, value: Rc<dyn Any>) {
    with_node(id, |node| node.context_set(key, value));
}

/// Walk `start` and its scope ancestors for a context value.
pub(crate) fn context_lookup(start: NodeId, key: &str) -> Option<Rc<dyn Any>> {
    let mut cursor = Some(start);
    while let Some(id) = cursor {
        let (value, parent) = with_node(id, |node| (node.context_get(key), node.scope()))?;
        if value.is_some() {
            return value;
        }
        cursor = parent;
    }
    None
}

/// Register the current observer as a reader of `id`.
///
/// No-op outside a tracked execution or when the node is disposed. A repeat
/// read in the same run refreshes the link's stamp instead of duplicating it.
pub(crate) fn track_read(id: NodeId) {
    let Some(observer) = context::observer() else {
        return;
    };
    if observer == id {
        return;
    }
    NODES.with(|nodes| {
        let mut nodes = nodes.borrow_mut();
        let Some(run) = nodes.get(&observer).map(|node| node.run()) else {
            return;
        };
        if let Some(node) = nodes.get_mut(&id) {
            node.observe(observer, run);
            tracing::trace!(
                source = id.raw(),
                observer = observer.raw(),
                run,
                "dependency linked"
            );
        }
    });
}

/// Invalidate the observers of `id`: prune stale links, mark the rest dirty,
/// and enqueue them.
///
/// A link is stale when its observer is disposed or did not read `id` during
/// its most recent run (the stamp lags the observer's generation).
pub(crate) fn notify(id: NodeId) {
    bootstrap();
    let targets = NODES.with(|nodes| {
        let mut nodes = nodes.borrow_mut();
        let snapshot: Vec<(NodeId, u64)> = match nodes.get(&id) {
            Some(node) => node.observers().to_vec(),
            None => return Vec::new(),
        };
        let mut targets = Vec::new();
        let mut stale = Vec::new();
        for (observer, stamp) in snapshot {
            match nodes.get_mut(&observer) {
                Some(node) if node.run() == stamp => {
                    node.mark_dirty();
                    targets.push(observer);
                }
                _ => stale.push(observer),
            }
        }
        if !stale.is_empty() {
            if let Some(node) = nodes.get_mut(&id) {
                node.retain_observers(|observer| !stale.contains(&observer));
            }
        }
        targets
    });
    for target in targets {
        Scheduler.enqueue(target);
    }
}

/// Recompute `id` through its update hook.
///
/// Implements the invalidation protocol: children of the previous run are
/// disposed, disposal callbacks run, buffered error handlers are cleared,
/// then the body executes with `id` installed as both observer and scope.
/// A changed value invalidates the node's own observers. Body errors are
/// routed through the scope error-handler chain; cycle errors are not.
pub(crate) fn run_update(id: NodeId) -> Result<bool> {
    let label = label_of(id);
    context::check_cycle(id, &label)?;
    let Some(update) = with_node(id, |node| node.update_hook()).flatten() else {
        return Ok(false);
    };

    for child in with_node(id, |node| node.take_children()).unwrap_or_default() {
        dispose_id(child);
    }
    for cleanup in with_node(id, |node| node.take_cleanups()).unwrap_or_default() {
        cleanup();
    }
    with_node(id, |node| {
        node.clear_error_handlers();
        node.begin_run();
    });

    let outcome = {
        let _tracking = context::enter(Some(id), Some(id));
        let _compute = context::push_compute(id, label);
        update()
    };

    with_node(id, |node| node.mark_clean());
    match outcome {
        Ok(changed) => {
            if changed {
                notify(id);
            }
            Ok(changed)
        }
        Err(err @ Error::CyclicDependency(_)) => Err(err),
        Err(err) => {
            if route_error(id, &err) {
                Ok(false)
            } else {
                Err(err)
            }
        }
    }
}

/// Walk the scope chain from `origin` outwards; the first scope with
/// handlers receives the error. Returns whether anyone handled it.
pub(crate) fn route_error(origin: NodeId, err: &Error) -> bool {
    let mut cursor = Some(origin);
    while let Some(id) = cursor {
        let Some((handlers, parent)) = with_node(id, |node| (node.error_handlers(), node.scope()))
        else {
            return false;
        };
        if !handlers.is_empty() {
            for handler in handlers {
                handler(err);
            }
            return true;
        }
        cursor = parent;
    }
    false
}

/// Scheduler runner: reconcile one enqueued node.
///
/// Disposed nodes and nodes already reconciled by an earlier pull-on-read
/// are skipped. Errors that no handler claims are reported here; a flush has
/// no caller to rethrow to.
fn flush_node(id: NodeId) {
    let runnable = with_node(id, |node| node.is_dirty() && node.update_hook().is_some());
    if runnable != Some(true) {
        return;
    }
    if let Err(err) = run_update(id) {
        tracing::error!(id = id.raw(), error = %err, "unhandled error during flush");
    }
}

/// Dispose `id` and its subtree.
///
/// Children are disposed before their parent; disposal callbacks run after
/// the children are gone; the node is then unlinked from its scope parent
/// and removed from the arena. Idempotent.
pub(crate) fn dispose_id(id: NodeId) {
    if !is_live(id) {
        return;
    }
    for child in with_node(id, |node| node.take_children()).unwrap_or_default() {
        dispose_id(child);
    }
    for cleanup in with_node(id, |node| node.take_cleanups()).unwrap_or_default() {
        cleanup();
    }
    let parent = with_node(id, |node| node.scope()).flatten();
    if let Some(parent) = parent {
        with_node(parent, |node| node.remove_child(id));
    }
    NODES.with(|nodes| nodes.borrow_mut().remove(&id));
    tracing::debug!(id = id.raw(), "node disposed");
}

/// A reactive entity backed by a graph node.
///
/// Implemented by every primitive handle; gives the free functions
/// (`dispose`, `scope_of`, the capability predicates) a uniform surface.
pub trait Reactive {
    /// The graph node backing this handle.
    fn node_id(&self) -> NodeId;

    /// Whether this handle exposes a readable reactive value.
    fn is_readable(&self) -> bool {
        true
    }

    /// Whether this handle exposes a write surface.
    fn is_writable(&self) -> bool {
        false
    }
}

/// True iff `x` is a readable reactive value.
pub fn is_observable(x: &dyn Reactive) -> bool {
    x.is_readable()
}

/// True iff `x` is a writable source.
pub fn is_subject(x: &dyn Reactive) -> bool {
    x.is_writable()
}

#[cfg(test)]
pub(crate) fn observer_count(id: NodeId) -> usize {
    with_node(id, |node| node.observers().len()).unwrap_or(0)
}

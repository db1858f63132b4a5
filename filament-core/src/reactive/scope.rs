//! Scope Tree, Context, and Error Handling
//!
//! Every node records the scope it was created under; scopes form a forest
//! used for three things: cascading disposal, hierarchical context lookup,
//! and the error-handler chain.
//!
//! `root` plants a detached scope and hands the caller its disposer; memos
//! and effects act as scopes for anything created during their bodies, so
//! ownership follows the shape of the computation automatically.

use std::rc::Rc;

use crate::error::Error;
use crate::graph::{NodeId, NodeKind};

use super::context;
use super::runtime::{self, Reactive};

/// Handle that disposes a root scope and its subtree.
#[derive(Debug, Clone)]
pub struct Disposer {
    id: NodeId,
}

impl Disposer {
    /// The root scope's node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Dispose the scope and everything created under it. Idempotent.
    pub fn dispose(&self) {
        runtime::dispose_id(self.id);
    }
}

/// Create a detached scope, run `init` under it, and return its result.
///
/// The scope owns every node created inside `init`; the caller is
/// responsible for invoking the passed [`Disposer`] to reclaim them.
pub fn root<R>(init: impl FnOnce(Disposer) -> R) -> R {
    let id = runtime::create_detached(NodeKind::Scope, None);
    let _guard = context::enter(Some(id), None);
    init(Disposer { id })
}

/// Synchronously dispose a reactive entity and its subtree. Idempotent.
pub fn dispose(target: &dyn Reactive) {
    runtime::dispose_id(target.node_id());
}

/// The scope parent of a reactive entity, if any.
pub fn scope_of(target: &dyn Reactive) -> Option<NodeId> {
    runtime::scope_parent(target.node_id())
}

/// Handle returned by [`on_dispose`]; runs the callback early and removes it
/// from the scope's disposal set.
pub struct DisposeHandle {
    target: Option<(NodeId, u64)>,
}

impl DisposeHandle {
    /// Run the callback now and unregister it. A callback that already ran
    /// (or whose scope is gone) is skipped.
    pub fn run(self) {
        let Some((node, key)) = self.target else {
            return;
        };
        if let Some(cleanup) = runtime::remove_cleanup(node, key) {
            cleanup();
        }
    }
}

/// Register a callback on the current scope's disposal set.
///
/// The callback runs when the scope is disposed or invalidated. With no
/// current scope this is a no-op and the returned handle is inert.
pub fn on_dispose(f: impl FnOnce() + 'static) -> DisposeHandle {
    let target = context::current_scope()
        .and_then(|scope| runtime::add_cleanup(scope, Box::new(f)).map(|key| (scope, key)));
    DisposeHandle { target }
}

/// Store a context value on the current scope. No-op without a scope.
pub fn set_context<T: 'static>(key: impl Into<String>, value: T) {
    if let Some(scope) = context::current_scope() {
        runtime::context_set(scope, key.into(), Rc::new(value));
    }
}

/// Look up a context value, walking from the current scope through its
/// ancestors. Missing keys (and a missing scope) resolve to `None`.
pub fn get_context<T: Clone + 'static>(key: &str) -> Option<T> {
    let start = context::current_scope()?;
    runtime::context_lookup(start, key)
        .and_then(|value| value.downcast_ref::<T>().cloned())
}

/// Register an error handler on the current scope.
///
/// When a computation under this scope fails, the nearest scope with
/// handlers receives the error; all of that scope's handlers run.
pub fn on_error(handler: impl Fn(&Error) + 'static) {
    if let Some(scope) = context::current_scope() {
        runtime::add_error_handler(scope, Rc::new(handler));
    }
}

/// Capture the current scope and return a wrapper that re-enters it on each
/// call, so context values and error handlers stay reachable.
///
/// The wrapper creates no derivation and tracks no dependencies; it returns
/// `None` once the captured scope has been disposed.
pub fn scope<R>(f: impl Fn() -> R + 'static) -> impl Fn() -> Option<R> {
    let captured = context::current_scope();
    move || {
        if let Some(id) = captured {
            if !runtime::is_live(id) {
                return None;
            }
        }
        let _guard = context::enter(captured, None);
        Some(f())
    }
}

//! Tracking Context
//!
//! Two ambient slots drive the whole engine: the *current observer* (the
//! node whose dependencies are being recorded) and the *current scope* (the
//! node that will own anything created right now). Both are thread-local and
//! are swapped in and out with drop-guards so that every exit path, normal
//! return or panic, restores the previous values.
//!
//! The module also keeps the compute stack used for cycle detection, and a
//! trail of computations entered since the last flush that gives cycle
//! errors a readable path.

use std::cell::{Cell, RefCell};

use crate::error::{Error, Result};
use crate::graph::NodeId;

thread_local! {
    static OBSERVER: Cell<Option<NodeId>> = Cell::new(None);
    static SCOPE: Cell<Option<NodeId>> = Cell::new(None);
    static STACK: RefCell<Vec<NodeId>> = RefCell::new(Vec::new());
    static TRAIL: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

/// The node currently recording its dependencies, if any.
pub(crate) fn observer() -> Option<NodeId> {
    OBSERVER.with(|slot| slot.get())
}

/// The scope that owns anything created right now, if any.
pub fn current_scope() -> Option<NodeId> {
    SCOPE.with(|slot| slot.get())
}

/// Guard that restores the previous observer/scope slots when dropped.
pub(crate) struct TrackingGuard {
    observer: Option<NodeId>,
    scope: Option<NodeId>,
}

/// Install new ambient slots for the duration of the returned guard.
///
/// This is the only mechanism by which dependency edges and scope edges are
/// created.
pub(crate) fn enter(scope: Option<NodeId>, observer: Option<NodeId>) -> TrackingGuard {
    TrackingGuard {
        observer: OBSERVER.with(|slot| slot.replace(observer)),
        scope: SCOPE.with(|slot| slot.replace(scope)),
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        OBSERVER.with(|slot| slot.set(self.observer));
        SCOPE.with(|slot| slot.set(self.scope));
    }
}

/// Run `f` with dependency tracking suppressed.
///
/// Reads inside `f` register no observer links, but nodes created inside are
/// still owned by the enclosing scope.
pub fn peek<R>(f: impl FnOnce() -> R) -> R {
    let _guard = enter(current_scope(), None);
    f()
}

/// Run `f` with both tracking and ownership suppressed.
///
/// Reads register no links and created nodes have no scope parent.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _guard = enter(None, None);
    f()
}

/// Guard for an entry on the compute stack.
pub(crate) struct ComputeGuard {
    id: NodeId,
}

/// Push a computation onto the compute stack and append it to the trail.
pub(crate) fn push_compute(id: NodeId, label: String) -> ComputeGuard {
    STACK.with(|stack| stack.borrow_mut().push(id));
    TRAIL.with(|trail| trail.borrow_mut().push(label));
    ComputeGuard { id }
}

impl Drop for ComputeGuard {
    fn drop(&mut self) {
        STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.id),
                "compute stack mismatch: expected {:?}, got {:?}",
                self.id,
                popped
            );
        });
    }
}

/// Fail if `id` is already being computed.
///
/// The error message carries the trail of computations entered since the
/// last flush, terminated by the re-entered node.
pub(crate) fn check_cycle(id: NodeId, label: &str) -> Result<()> {
    let on_stack = STACK.with(|stack| stack.borrow().contains(&id));
    if !on_stack {
        return Ok(());
    }
    let mut trail = TRAIL.with(|trail| trail.borrow().clone());
    trail.push(label.to_string());
    Err(Error::CyclicDependency(trail.join(" -> ")))
}

/// Clear the trail. Installed as a post-flush hook by the runtime.
pub(crate) fn reset_trail() {
    TRAIL.with(|trail| trail.borrow_mut().clear());
}

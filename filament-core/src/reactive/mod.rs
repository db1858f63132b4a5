//! Reactive Primitives
//!
//! This module implements the reactive layer on top of the dependency
//! graph: signals, memos, effects, and the scope tree that owns them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Reading it inside a tracked
//! execution (a memo or effect body) registers the reader as an observer;
//! writing a changed value marks every observer dirty and enqueues it.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result and recomputes lazily:
//! a dirty memo reconciles when it is next read (or when the flush reaches
//! it), reading its own dependencies first, so it never observes a
//! partially-updated graph.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation, primed once at creation and
//! re-run by the scheduler on every invalidation. A cleanup returned by the
//! body runs before each re-run and on stop.
//!
//! ## Scopes
//!
//! Every node is owned by the scope it was created under: a `root`, or the
//! memo/effect whose body created it. Disposal cascades children-first, and
//! scopes carry context values and error handlers for everything beneath
//! them.
//!
//! # Implementation Notes
//!
//! Dependency detection is automatic: a thread-local tracking context
//! records the currently-computing node, and reads link to it. This
//! "transparent reactivity" approach is the one used by SolidJS, Vue 3, and
//! Leptos.

use std::rc::Rc;

mod context;
mod effect;
mod memo;
mod runtime;
mod scope;
mod signal;

pub use context::{current_scope, peek, untrack};
pub use effect::{Effect, EffectOptions};
pub use memo::{Memo, MemoOptions};
pub use runtime::{is_observable, is_subject, Reactive};
pub use scope::{
    dispose, get_context, on_dispose, on_error, root, scope, scope_of, set_context,
    DisposeHandle, Disposer,
};
pub use signal::{Readonly, Signal, SignalOptions};

/// Comparator deciding whether `next` differs from `prev` and should
/// therefore propagate. Returns true when the value changed.
pub type DirtyCheck<T> = Rc<dyn Fn(&T, &T) -> bool>;

//! Signal Implementation
//!
//! A Signal is the writable source at the root of the reactive graph. It
//! holds a value and a graph node; reading it inside a tracked execution
//! links the current observer, and writing it invalidates those observers.
//!
//! # How Signals Work
//!
//! 1. `get` returns the value and, under a tracked execution, registers the
//!    current observer in the signal's node.
//!
//! 2. `set` compares the incoming value against the current one with the
//!    dirty comparator. An unchanged value is dropped; a changed one is
//!    stored and every observer is marked dirty and enqueued.
//!
//! 3. A disposed signal still answers reads with its last value, but writes
//!    become silent no-ops.
//!
//! The value lives behind `Rc<RefCell<_>>` in the handle, not in the graph
//! node, so clones of the handle share state and reads survive disposal.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::graph::{NodeId, NodeKind};

use super::runtime::{self, Reactive};
use super::DirtyCheck;

/// Configuration for [`Signal::with_options`].
pub struct SignalOptions<T> {
    /// Debug label used in cycle trails and tracing.
    pub name: Option<String>,
    /// Comparator deciding whether a written value differs from the current
    /// one; returns true when the write should propagate. Defaults to
    /// `PartialEq` inequality.
    pub dirty: Option<DirtyCheck<T>>,
}

impl<T> Default for SignalOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            dirty: None,
        }
    }
}

/// A writable reactive value.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let value = count.get();   // read (tracks under a tracked execution)
/// count.set(5);              // write (invalidates observers)
/// count.update(|n| n + 1);   // write derived from the current value
/// ```
pub struct Signal<T>
where
    T: Clone + 'static,
{
    id: NodeId,
    value: Rc<RefCell<T>>,
    changed: DirtyCheck<T>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_options(value, SignalOptions::default())
    }

    /// Create a new signal with a debug name or a custom dirty comparator.
    pub fn with_options(value: T, options: SignalOptions<T>) -> Self {
        let changed = options
            .dirty
            .unwrap_or_else(|| Rc::new(|prev: &T, next: &T| prev != next));
        let id = runtime::create(NodeKind::Source, options.name);
        Self {
            id,
            value: Rc::new(RefCell::new(value)),
            changed,
        }
    }
}

impl<T> Signal<T>
where
    T: Clone + 'static,
{
    /// Get the signal's graph node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within a tracked execution, registers the current observer
    /// as a dependent of this signal.
    pub fn get(&self) -> T {
        runtime::track_read(self.id);
        self.value.borrow().clone()
    }

    /// Get the current value without establishing a dependency.
    pub fn peek(&self) -> T {
        self.value.borrow().clone()
    }

    /// Set a new value and invalidate observers.
    ///
    /// The write is dropped when the dirty comparator considers the value
    /// unchanged, and is a silent no-op once the signal is disposed.
    pub fn set(&self, next: T) {
        if !runtime::is_live(self.id) {
            return;
        }
        let changed = {
            let current = self.value.borrow();
            (self.changed)(&current, &next)
        };
        if changed {
            *self.value.borrow_mut() = next;
            runtime::notify(self.id);
        }
    }

    /// Update the value from the current one: `set(f(&current))`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = {
            let current = self.value.borrow();
            f(&current)
        };
        self.set(next);
    }

    /// A read-only view of this signal.
    pub fn readonly(&self) -> Readonly<T> {
        Readonly {
            inner: self.clone(),
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Rc::clone(&self.value),
            changed: Rc::clone(&self.changed),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.peek())
            .finish()
    }
}

impl<T> Reactive for Signal<T>
where
    T: Clone + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_writable(&self) -> bool {
        true
    }
}

/// A read-only view over a [`Signal`].
///
/// Forwards reads (with tracking) and exposes no write surface; it reports
/// as observable but not as a subject.
pub struct Readonly<T>
where
    T: Clone + 'static,
{
    inner: Signal<T>,
}

impl<T> Readonly<T>
where
    T: Clone + 'static,
{
    /// Get the current value, tracking under a tracked execution.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Get the current value without establishing a dependency.
    pub fn peek(&self) -> T {
        self.inner.peek()
    }

    /// Get the underlying graph node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id()
    }
}

impl<T> Clone for Readonly<T>
where
    T: Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for Readonly<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readonly")
            .field("id", &self.id())
            .field("value", &self.peek())
            .finish()
    }
}

impl<T> Reactive for Readonly<T>
where
    T: Clone + 'static,
{
    fn node_id(&self) -> NodeId {
        self.inner.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::runtime::{is_observable, is_subject};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn set_on_disposed_signal_is_a_no_op() {
        let signal = Signal::new(7);
        runtime::dispose_id(signal.id());

        signal.set(100);
        assert_eq!(signal.get(), 7);
    }

    #[test]
    fn readonly_forwards_reads_and_hides_writes() {
        let signal = Signal::new(3);
        let view = signal.readonly();

        assert_eq!(view.get(), 3);
        signal.set(4);
        assert_eq!(view.get(), 4);

        assert!(is_observable(&view));
        assert!(!is_subject(&view));
        assert!(is_subject(&signal));
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        assert_ne!(s1.id(), s2.id());
    }
}

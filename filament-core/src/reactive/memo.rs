//! Memo Implementation
//!
//! A Memo is a cached derivation: a function of reactive dependencies whose
//! result is memoised and recomputed only when something it read has
//! changed.
//!
//! # Read Semantics
//!
//! On `get`/`try_get`:
//!
//! 1. Register the current observer (same as a signal read).
//! 2. Cycle check: a memo already on the compute stack fails with a
//!    cyclic-dependency error naming the chain.
//! 3. Clean: return the cached value.
//! 4. Dirty: children of the previous run are disposed, disposal callbacks
//!    run, then the body executes with this memo as observer and scope.
//!    A changed result invalidates the memo's own observers.
//!
//! Dependencies are re-discovered on every run: reads during the new body
//! stamp fresh links, and links a branch no longer takes go stale and are
//! pruned on the next notification. A memo that is never read again simply
//! stays dirty; no work happens until someone pulls.
//!
//! # Errors
//!
//! Bodies built with [`Memo::try_new`] may fail. A failing run is routed
//! through the scope error-handler chain; the memo then answers with its
//! `fallback` if this was the very first run, or with the previous value.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::graph::{NodeId, NodeKind};

use super::runtime::{self, Reactive};
use super::DirtyCheck;

/// Configuration for [`Memo::with_options`].
pub struct MemoOptions<T> {
    /// Debug label used in cycle trails and tracing.
    pub name: Option<String>,
    /// Comparator deciding whether a recomputed value differs from the
    /// cached one. Defaults to `PartialEq` inequality.
    pub dirty: Option<DirtyCheck<T>>,
    /// Value returned when the very first run fails.
    pub fallback: Option<T>,
}

impl<T> Default for MemoOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            dirty: None,
            fallback: None,
        }
    }
}

type Body<T> = Box<dyn FnMut() -> Result<T>>;

/// A memoised derivation of reactive dependencies.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(2);
/// let doubled = Memo::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(10);
/// assert_eq!(doubled.get(), 20); // recomputes on read, no tick needed
/// ```
pub struct Memo<T>
where
    T: Clone + 'static,
{
    id: NodeId,
    value: Rc<RefCell<Option<T>>>,
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a memo from an infallible body. The body does not run until
    /// the first read.
    pub fn new(mut body: impl FnMut() -> T + 'static) -> Self {
        Self::with_options(MemoOptions::default(), move || body())
    }

    /// Create a memo with a name, comparator, or fallback.
    pub fn with_options(options: MemoOptions<T>, mut body: impl FnMut() -> T + 'static) -> Self {
        Self::build(options, Box::new(move || Ok(body())))
    }

    /// Create a memo from a fallible body.
    pub fn try_new(body: impl FnMut() -> Result<T> + 'static) -> Self {
        Self::try_with_options(MemoOptions::default(), body)
    }

    /// Create a fallible memo with a name, comparator, or fallback.
    pub fn try_with_options(
        options: MemoOptions<T>,
        body: impl FnMut() -> Result<T> + 'static,
    ) -> Self {
        Self::build(options, Box::new(body))
    }

    fn build(options: MemoOptions<T>, body: Body<T>) -> Self {
        let changed = options
            .dirty
            .unwrap_or_else(|| Rc::new(|prev: &T, next: &T| prev != next));
        let fallback = options.fallback;
        let value: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let id = runtime::create(NodeKind::Derived, options.name);

        let body = RefCell::new(body);
        let cell = Rc::clone(&value);
        runtime::set_update(
            id,
            Rc::new(move || match (body.borrow_mut())() {
                Ok(next) => {
                    let mut slot = cell.borrow_mut();
                    let is_changed = match slot.as_ref() {
                        Some(prev) => (changed)(prev, &next),
                        None => true,
                    };
                    if is_changed {
                        *slot = Some(next);
                    }
                    Ok(is_changed)
                }
                Err(err) => {
                    let mut slot = cell.borrow_mut();
                    if slot.is_none() {
                        *slot = fallback.clone();
                    }
                    Err(err)
                }
            }),
        );

        Self { id, value }
    }
}

impl<T> Memo<T>
where
    T: Clone + 'static,
{
    /// Get the memo's graph node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics on a cyclic dependency or when an error reaches this read
    /// unhandled; use [`Memo::try_get`] to observe those as values.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("memo read failed: {err}"),
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// A clean memo answers from cache without running its body. Errors the
    /// scope handler chain does not claim are returned to this caller; after
    /// a handled failure the previous value (or first-run fallback) is
    /// returned instead.
    pub fn try_get(&self) -> Result<T> {
        runtime::track_read(self.id);
        context_cycle_check(self.id)?;
        if runtime::is_dirty(self.id) {
            runtime::run_update(self.id)?;
        }
        match self.value.borrow().as_ref() {
            Some(value) => Ok(value.clone()),
            None => Err(Error::Unavailable(runtime::label_of(self.id))),
        }
    }

    /// Whether the memo has produced a value.
    pub fn has_value(&self) -> bool {
        self.value.borrow().is_some()
    }
}

fn context_cycle_check(id: NodeId) -> Result<()> {
    super::context::check_cycle(id, &runtime::label_of(id))
}

impl<T> Clone for Memo<T>
where
    T: Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Rc::clone(&self.value),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id)
            .field("value", &self.value.borrow())
            .finish()
    }
}

impl<T> Reactive for Memo<T>
where
    T: Clone + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tick;
    use crate::reactive::signal::Signal;
    use std::cell::Cell;

    #[test]
    fn memo_computes_on_first_access_only() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();

        let memo = Memo::new(move || {
            counter.set(counter.get() + 1);
            42
        });

        assert!(!memo.has_value());
        assert_eq!(runs.get(), 0);

        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn memo_recomputes_on_read_after_dependency_write() {
        let source = Signal::new(10);
        let runs = Rc::new(Cell::new(0));

        let memo = Memo::new({
            let source = source.clone();
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                source.get() * 2
            }
        });

        assert_eq!(memo.get(), 20);
        source.set(25);

        // Pull-on-read: no tick required.
        assert_eq!(memo.get(), 50);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn unchanged_recompute_does_not_invalidate_observers() {
        let source = Signal::new(4);
        let parity = Memo::new({
            let source = source.clone();
            move || source.get() % 2
        });
        let downstream_runs = Rc::new(Cell::new(0));
        let downstream = Memo::new({
            let parity = parity.clone();
            let runs = downstream_runs.clone();
            move || {
                runs.set(runs.get() + 1);
                parity.get() + 10
            }
        });

        assert_eq!(downstream.get(), 10);
        assert_eq!(downstream_runs.get(), 1);

        // 4 -> 6 keeps parity at 0; downstream must stay cached.
        source.set(6);
        tick();
        assert_eq!(downstream.get(), 10);
        assert_eq!(downstream_runs.get(), 1);
    }

    #[test]
    fn branch_not_taken_drops_the_stale_link() {
        let use_left = Signal::new(true);
        let left = Signal::new(1);
        let right = Signal::new(2);
        let runs = Rc::new(Cell::new(0));

        let memo = Memo::new({
            let use_left = use_left.clone();
            let left = left.clone();
            let right = right.clone();
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                if use_left.get() {
                    left.get()
                } else {
                    right.get()
                }
            }
        });

        assert_eq!(memo.get(), 1);
        use_left.set(false);
        assert_eq!(memo.get(), 2);
        assert_eq!(runs.get(), 2);

        // `left` is no longer read; writing it must not re-run the memo.
        left.set(100);
        tick();
        assert_eq!(memo.get(), 2);
        assert_eq!(runs.get(), 2);

        right.set(7);
        assert_eq!(memo.get(), 7);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn custom_dirty_comparator_suppresses_propagation() {
        let source = Signal::new(10);
        let magnitude = Memo::with_options(
            MemoOptions {
                // Treat values within the same decade as equal.
                dirty: Some(Rc::new(|prev: &i32, next: &i32| prev / 10 != next / 10)),
                ..MemoOptions::default()
            },
            {
                let source = source.clone();
                move || source.get()
            },
        );
        let seen = Rc::new(Cell::new(0));
        let reader = Memo::new({
            let magnitude = magnitude.clone();
            let seen = seen.clone();
            move || {
                seen.set(seen.get() + 1);
                magnitude.get()
            }
        });

        assert_eq!(reader.get(), 10);
        source.set(15);
        tick();
        assert_eq!(reader.get(), 10);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn fallback_answers_a_failed_first_run() {
        let attempts = Rc::new(Cell::new(0));
        let memo = Memo::try_with_options(
            MemoOptions {
                fallback: Some(-1),
                ..MemoOptions::default()
            },
            {
                let attempts = attempts.clone();
                move || {
                    attempts.set(attempts.get() + 1);
                    Err(Error::Computation("boom".to_string()))
                }
            },
        );

        let err = memo.try_get().unwrap_err();
        assert_eq!(err, Error::Computation("boom".to_string()));
        assert_eq!(memo.try_get(), Ok(-1));
        // The failed run cleared the dirty flag; no hot retry loop.
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn previous_value_is_retained_on_a_later_failure() {
        let source = Signal::new(1);
        let memo = Memo::try_new({
            let source = source.clone();
            move || {
                let n = source.get();
                if n < 0 {
                    Err(Error::Computation("negative".to_string()))
                } else {
                    Ok(n * 10)
                }
            }
        });

        assert_eq!(memo.try_get(), Ok(10));

        source.set(-1);
        assert!(memo.try_get().is_err());
        assert_eq!(memo.try_get(), Ok(10));
    }

    #[test]
    fn direct_self_reference_is_a_cycle() {
        let slot: Rc<RefCell<Option<Memo<i32>>>> = Rc::new(RefCell::new(None));
        let memo = Memo::try_new({
            let slot = slot.clone();
            move || match slot.borrow().as_ref() {
                Some(me) => me.try_get(),
                None => Ok(0),
            }
        });
        *slot.borrow_mut() = Some(memo.clone());

        let err = memo.try_get().unwrap_err();
        assert!(err.to_string().contains("cyclic dependency"));
    }

    #[test]
    fn mutual_cycle_names_the_chain() {
        let a_slot: Rc<RefCell<Option<Memo<i32>>>> = Rc::new(RefCell::new(None));
        let b = Memo::try_with_options(
            MemoOptions {
                name: Some("b".to_string()),
                ..MemoOptions::default()
            },
            {
                let a_slot = a_slot.clone();
                move || match a_slot.borrow().as_ref() {
                    Some(a) => a.try_get(),
                    None => Ok(0),
                }
            },
        );
        let a = Memo::try_with_options(
            MemoOptions {
                name: Some("a".to_string()),
                ..MemoOptions::default()
            },
            {
                let b = b.clone();
                move || b.try_get()
            },
        );
        *a_slot.borrow_mut() = Some(a);

        let err = b.try_get().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cyclic dependency"));
        assert!(message.contains("b"));
        assert!(message.contains("a"));
    }

    #[test]
    fn disposed_memo_answers_with_its_last_value() {
        let source = Signal::new(5);
        let memo = Memo::new({
            let source = source.clone();
            move || source.get() + 1
        });
        assert_eq!(memo.get(), 6);

        runtime::dispose_id(memo.id());
        source.set(50);
        tick();
        assert_eq!(memo.get(), 6);
    }
}

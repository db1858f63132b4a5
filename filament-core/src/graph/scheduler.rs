//! Update Scheduler
//!
//! A single-threaded, microtask-coalesced queue of invalidated nodes.
//!
//! # How It Works
//!
//! 1. When a source write (or a changed derivation) invalidates an observer,
//!    the observer is enqueued. The queue preserves first-insertion order and
//!    never holds a node twice at once.
//!
//! 2. The first enqueue after a flush asks the host to schedule a flush on
//!    its microtask queue, if a hook is installed. Further enqueues coalesce.
//!
//! 3. `flush` drains the queue synchronously, invoking each node through the
//!    runner installed by the reactive runtime. Nodes enqueued while draining
//!    are processed in the same flush.
//!
//! The scheduler knows nothing about signals or memos: it moves `NodeId`s
//! and calls an injected runner, so the graph layer stays independent of the
//! reactive primitives built on top of it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::node::NodeId;

struct SchedulerState {
    queue: VecDeque<NodeId>,
    queued: HashSet<NodeId>,
    /// Tick at which each node was last enqueued; consulted by `served`.
    stamps: HashMap<NodeId, u64>,
    tick: u64,
    flushing: bool,
    flush_requested: bool,
    runner: Option<Rc<dyn Fn(NodeId)>>,
    flush_hooks: Vec<Rc<dyn Fn()>>,
    microtask: Option<Rc<dyn Fn()>>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            stamps: HashMap::new(),
            tick: 0,
            flushing: false,
            flush_requested: false,
            runner: None,
            flush_hooks: Vec::new(),
            microtask: None,
        }
    }
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::new());
}

/// Handle to the thread-local scheduler.
///
/// Zero-sized; obtain one with [`scheduler`]. All state lives in
/// thread-local storage, so handles are interchangeable.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler;

impl Scheduler {
    /// Add a node to the pending queue, preserving first-insertion order.
    ///
    /// A node already pending is not enqueued again; later writes coalesce
    /// into the existing entry. If no flush is pending, the host microtask
    /// hook (when installed) is asked to schedule one.
    pub fn enqueue(&self, id: NodeId) {
        let hook = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.queued.insert(id) {
                state.queue.push_back(id);
                let stamp = if state.flushing {
                    state.tick
                } else {
                    state.tick + 1
                };
                state.stamps.insert(id, stamp);
                tracing::trace!(id = id.raw(), stamp, "node enqueued");
            }
            if !state.flushing && !state.flush_requested {
                if let Some(hook) = state.microtask.clone() {
                    state.flush_requested = true;
                    return Some(hook);
                }
            }
            None
        });
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Synchronously drain the pending queue.
    ///
    /// Each node is invoked through the installed runner in enqueue order;
    /// nodes enqueued during the drain are processed in the same flush.
    /// Re-entrant calls are no-ops. Post-flush hooks run after the drain.
    pub fn flush(&self) {
        let runner = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.flushing {
                return None;
            }
            state.flushing = true;
            state.flush_requested = false;
            state.tick += 1;
            tracing::debug!(tick = state.tick, pending = state.queue.len(), "flush begin");
            Some(state.runner.clone())
        });
        let Some(runner) = runner else {
            return;
        };

        loop {
            let next = STATE.with(|state| {
                let mut state = state.borrow_mut();
                let next = state.queue.pop_front();
                if let Some(id) = next {
                    state.queued.remove(&id);
                }
                next
            });
            let Some(id) = next else {
                break;
            };
            if let Some(runner) = &runner {
                runner(id);
            }
        }

        let hooks = STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.flushing = false;
            let tick = state.tick;
            state.stamps.retain(|_, stamp| *stamp >= tick);
            tracing::debug!(tick, "flush end");
            state.flush_hooks.clone()
        });
        for hook in hooks {
            hook();
        }
    }

    /// Flush synchronously and return the current tick counter.
    pub fn tick(&self) -> u64 {
        self.flush();
        STATE.with(|state| state.borrow().tick)
    }

    /// Whether `id` was enqueued for the current or most recent flush.
    pub fn served(&self, id: NodeId) -> bool {
        STATE.with(|state| {
            let state = state.borrow();
            state.stamps.get(&id).is_some_and(|stamp| *stamp >= state.tick)
        })
    }

    /// Register a hook that runs after every flush.
    pub fn on_flush(&self, hook: impl Fn() + 'static) {
        STATE.with(|state| state.borrow_mut().flush_hooks.push(Rc::new(hook)));
    }

    /// Install the host microtask hook. The scheduler invokes it (at most
    /// once per pending flush) when work arrives; the hook should arrange
    /// for `flush` to run on the host's next microtask.
    pub fn set_microtask_hook(&self, hook: impl Fn() + 'static) {
        STATE.with(|state| state.borrow_mut().microtask = Some(Rc::new(hook)));
    }

    /// Install the node runner. The first installation wins; the reactive
    /// runtime does this at bootstrap.
    pub(crate) fn set_runner(&self, runner: Rc<dyn Fn(NodeId)>) {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.runner.is_none() {
                state.runner = Some(runner);
            }
        });
    }
}

/// Access the thread-local scheduler.
pub fn scheduler() -> Scheduler {
    Scheduler
}

/// Synchronously flush the scheduler and return the current tick counter.
pub fn tick() -> u64 {
    Scheduler.tick()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc;

    fn install_recording_runner() -> Rc<StdRefCell<Vec<NodeId>>> {
        let seen = Rc::new(StdRefCell::new(Vec::new()));
        let sink = seen.clone();
        Scheduler.set_runner(Rc::new(move |id| sink.borrow_mut().push(id)));
        seen
    }

    #[test]
    fn flush_processes_in_enqueue_order() {
        let seen = install_recording_runner();
        let a = NodeId::new();
        let b = NodeId::new();
        let c = NodeId::new();

        Scheduler.enqueue(b);
        Scheduler.enqueue(a);
        Scheduler.enqueue(c);
        Scheduler.flush();

        assert_eq!(*seen.borrow(), vec![b, a, c]);
    }

    #[test]
    fn enqueue_coalesces_duplicates() {
        let seen = install_recording_runner();
        let a = NodeId::new();

        Scheduler.enqueue(a);
        Scheduler.enqueue(a);
        Scheduler.enqueue(a);
        Scheduler.flush();

        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn nodes_enqueued_mid_flush_run_in_same_flush() {
        let follow = NodeId::new();
        let first = NodeId::new();
        let seen = Rc::new(StdRefCell::new(Vec::new()));
        let sink = seen.clone();
        Scheduler.set_runner(Rc::new(move |id| {
            sink.borrow_mut().push(id);
            if id == first {
                Scheduler.enqueue(follow);
            }
        }));

        Scheduler.enqueue(first);
        Scheduler.flush();

        assert_eq!(*seen.borrow(), vec![first, follow]);
    }

    #[test]
    fn tick_counts_flushes() {
        let _ = install_recording_runner();
        let before = Scheduler.tick();
        let after = Scheduler.tick();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn served_reflects_current_and_most_recent_flush() {
        let _ = install_recording_runner();
        let a = NodeId::new();
        let b = NodeId::new();

        Scheduler.enqueue(a);
        assert!(Scheduler.served(a));
        assert!(!Scheduler.served(b));

        Scheduler.flush();
        assert!(Scheduler.served(a));

        // A later flush without `a` retires it.
        Scheduler.enqueue(b);
        Scheduler.flush();
        assert!(!Scheduler.served(a));
        assert!(Scheduler.served(b));
    }

    #[test]
    fn on_flush_hooks_run_after_drain() {
        let _ = install_recording_runner();
        let fired = Rc::new(StdRefCell::new(0));
        let sink = fired.clone();
        Scheduler.on_flush(move || *sink.borrow_mut() += 1);

        Scheduler.flush();
        Scheduler.flush();
        assert_eq!(*fired.borrow(), 2);
    }

    #[test]
    fn microtask_hook_fires_once_per_pending_flush() {
        let _ = install_recording_runner();
        let requests = Rc::new(StdRefCell::new(0));
        let sink = requests.clone();
        Scheduler.set_microtask_hook(move || *sink.borrow_mut() += 1);

        Scheduler.enqueue(NodeId::new());
        Scheduler.enqueue(NodeId::new());
        assert_eq!(*requests.borrow(), 1);

        Scheduler.flush();
        Scheduler.enqueue(NodeId::new());
        assert_eq!(*requests.borrow(), 2);
    }
}

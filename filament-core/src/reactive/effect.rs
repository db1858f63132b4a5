//! Effect Implementation
//!
//! An Effect is a derivation run for its side effects: its value is unused,
//! but its body is guaranteed to re-run on every invalidation of something
//! it read. Effects are the bridge from the reactive graph to the outside
//! world.
//!
//! # How Effects Work
//!
//! 1. The body runs once synchronously at creation to produce side effects
//!    and establish the initial dependency set.
//!
//! 2. When a dependency changes, the effect is marked dirty and enqueued;
//!    the next flush re-runs it.
//!
//! 3. A closure returned by [`Effect::with_cleanup`] bodies is registered on
//!    the effect's own node, so it runs before every re-run and once more
//!    when the effect stops.
//!
//! 4. `stop` disposes the effect and everything created under it.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::error::Result;
use crate::graph::{NodeId, NodeKind};

use super::runtime::{self, Reactive};

/// Configuration for [`Effect::with_options`].
#[derive(Debug, Clone, Default)]
pub struct EffectOptions {
    /// Debug label used in cycle trails and tracing.
    pub name: Option<String>,
}

type Cleanup = Box<dyn FnOnce()>;
type Body = Box<dyn FnMut() -> Result<Option<Cleanup>>>;

/// A side-effecting computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("count is {}", count.get())
/// });                    // prints "count is 0" immediately
///
/// count.set(5);
/// tick();                // prints "count is 5"
/// effect.stop();
/// ```
pub struct Effect {
    id: NodeId,
}

impl Effect {
    /// Create an effect. The body runs immediately to produce the first side
    /// effects and establish dependencies.
    pub fn new(mut body: impl FnMut() + 'static) -> Self {
        Self::with_options(EffectOptions::default(), move || body())
    }

    /// Create a named effect.
    pub fn with_options(options: EffectOptions, mut body: impl FnMut() + 'static) -> Self {
        match Self::build(
            options,
            Box::new(move || {
                body();
                Ok(None)
            }),
        ) {
            Ok(effect) => effect,
            // An infallible body cannot produce an error on priming.
            Err(err) => panic!("effect priming failed: {err}"),
        }
    }

    /// Create an effect whose body returns a cleanup closure.
    ///
    /// The cleanup runs before every re-run and once more on `stop`, so the
    /// total number of cleanup calls equals the number of re-runs plus one.
    pub fn with_cleanup<C>(mut body: impl FnMut() -> C + 'static) -> Self
    where
        C: FnOnce() + 'static,
    {
        match Self::build(
            EffectOptions::default(),
            Box::new(move || Ok(Some(Box::new(body()) as Cleanup))),
        ) {
            Ok(effect) => effect,
            Err(err) => panic!("effect priming failed: {err}"),
        }
    }

    /// Create an effect from a fallible body.
    ///
    /// Errors are routed through the scope error-handler chain; an error the
    /// chain does not claim during priming disposes the effect and is
    /// returned here. Later unhandled failures are reported at the flush.
    pub fn try_new(body: impl FnMut() -> Result<()> + 'static) -> Result<Self> {
        let mut body = body;
        Self::build(EffectOptions::default(), Box::new(move || body().map(|_| None)))
    }

    fn build(options: EffectOptions, body: Body) -> Result<Self> {
        let id = runtime::create(NodeKind::Effect, options.name);
        let body = RefCell::new(body);
        runtime::set_update(
            id,
            Rc::new(move || {
                let cleanup = (body.borrow_mut())()?;
                if let Some(cleanup) = cleanup {
                    runtime::add_cleanup(id, cleanup);
                }
                Ok(true)
            }),
        );
        // Prime synchronously.
        match runtime::run_update(id) {
            Ok(_) => Ok(Self { id }),
            Err(err) => {
                runtime::dispose_id(id);
                Err(err)
            }
        }
    }

    /// Get the effect's graph node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Stop the effect: run its cleanup and dispose it together with
    /// everything created under it. Idempotent.
    pub fn stop(&self) {
        runtime::dispose_id(self.id);
    }

    /// Whether the effect has been stopped (or disposed via an ancestor).
    pub fn is_stopped(&self) -> bool {
        !runtime::is_live(self.id)
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self { id: self.id }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Reactive for Effect {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_readable(&self) -> bool {
        false
    }
}

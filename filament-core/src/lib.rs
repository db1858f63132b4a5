//! Filament Core
//!
//! This crate provides a fine-grained reactive computation runtime:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Automatic dependency tracking with pull-on-read recomputation
//! - A microtask-coalesced scheduler driven by the host
//! - A scope tree for ownership, context, and error handling
//!
//! The runtime is embedded in a host application; it performs no I/O, owns
//! no threads, and keeps no persistent state. All reactivity is driven by
//! synchronous reads, synchronous writes, and the host invoking [`tick`]
//! (or wiring [`Scheduler::set_microtask_hook`] into its microtask queue).
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: the dependency graph layer (node records and the scheduler)
//! - `reactive`: the primitives and the engine built on top of it
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_core::{Effect, Memo, Signal, tick};
//!
//! let count = Signal::new(0);
//!
//! let doubled = Memo::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! let effect = Effect::new({
//!     let doubled = doubled.clone();
//!     move || println!("doubled = {}", doubled.get())
//! });
//! // Prints: "doubled = 0"
//!
//! count.set(5);
//! tick();
//! // Prints: "doubled = 10"
//!
//! effect.stop();
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{Error, Result};
pub use graph::{scheduler, tick, NodeId, NodeKind, Scheduler};
pub use reactive::{
    current_scope, dispose, get_context, is_observable, is_subject, on_dispose, on_error, peek,
    root, scope, scope_of, set_context, untrack, DirtyCheck, DisposeHandle, Disposer, Effect,
    EffectOptions, Memo, MemoOptions, Readonly, Reactive, Signal, SignalOptions,
};

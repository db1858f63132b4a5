//! Error types for filament-core.

use thiserror::Error;

/// Result type for filament-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A derivation re-entered itself while computing. The payload is the
    /// trail of computations entered since the last flush.
    #[error("cyclic dependency detected: {0}")]
    CyclicDependency(String),

    /// A user computation failed. Raised by fallible derivation and effect
    /// bodies; routed through the scope error-handler chain.
    #[error("computation failed: {0}")]
    Computation(String),

    /// A derivation has no value to return: its first computation failed
    /// with no fallback configured, or it was disposed before ever running.
    #[error("no value available: {0}")]
    Unavailable(String),
}

//! Engine error type.

use thiserror::Error;

/// Error returned by media engine operations.
///
/// The engine is an external collaborator; the session controller does not
/// interpret failures beyond creation-vs-teardown context. Creation
/// failures are surfaced to the requesting client, teardown failures are
/// logged and swallowed by the cleanup cascade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine rejected or failed an operation.
    #[error("engine operation failed: {0}")]
    OperationFailed(String),

    /// The target handle is already closed on the engine side.
    #[error("engine resource already closed")]
    Closed,
}

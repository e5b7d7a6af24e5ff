use thiserror::Error;

/// Errors surfaced to RPC clients.
///
/// Each variant maps onto exactly one JSON-RPC error code in `ipc` —
/// `NotFound` is a first-class condition, never a message pattern.
#[derive(Debug, Error)]
pub enum TodoError {
    /// Request rejected before the store is touched.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// The target todo does not exist (update/delete on a dead id).
    #[error("todo {0} not found")]
    NotFound(i64),

    /// Unknown RPC method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Underlying persistence failure — connection, constraint, corruption.
    #[error("store failure: {0}")]
    Store(#[from] sqlx::Error),

    /// A query exceeded the standard timeout (store-fault flavor).
    #[error("database query timed out after {0}s")]
    Timeout(u64),
}

impl TodoError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

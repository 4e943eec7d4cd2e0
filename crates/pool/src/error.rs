//! Error types for pool operations
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`Pool`](crate::Pool) operations and [`Factory`](crate::Factory)
/// implementations.
#[derive(Error, Debug)]
pub enum Error {
    /// Pool configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// No resource became available before the acquisition deadline
    #[error("Acquire timed out after {timeout_ms}ms: {active}/{max_size} in use, {waiters} waiting")]
    Timeout {
        /// The timeout that elapsed, in milliseconds
        timeout_ms: u64,
        /// Number of checked-out resources when the deadline passed
        active: usize,
        /// Configured maximum pool size
        max_size: usize,
        /// Number of other callers still waiting
        waiters: usize,
    },

    /// The caller's cancellation token fired while acquiring
    #[error("Acquire was cancelled")]
    Cancelled,

    /// A released resource is not currently checked out from this pool
    #[error("Resource '{id}' is not checked out from this pool")]
    InvalidResource {
        /// Identifier of the rejected resource
        id: String,
    },

    /// The factory failed to construct a resource
    #[error("Factory failed to create resource: {reason}")]
    Factory {
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Destroying a resource failed
    #[error("Cleanup failed for resource '{id}': {reason}")]
    Cleanup {
        /// Identifier of the resource being destroyed
        id: String,
        /// The failure reason
        reason: String,
    },

    /// The pool has been shut down
    #[error("Pool is closed")]
    PoolClosed,
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a factory error without an underlying source
    pub fn factory<S: Into<String>>(reason: S) -> Self {
        Self::Factory {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a factory error wrapping the error that caused it
    pub fn factory_with_source<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Factory {
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cleanup error
    pub fn cleanup(id: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::Cleanup {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if retrying the failed operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled)
    }
}

//! Per-call acquisition context with cancellation support

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Context for a single acquisition.
///
/// Carries the caller's cancellation token, an optional override of the
/// pool's acquisition timeout, and arbitrary metadata. It is also handed to
/// [`Factory::create`](crate::Factory::create) so construction can observe
/// cancellation and caller hints.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Cooperative cancellation token. When cancelled, a pending acquire
    /// fails with [`Error::Cancelled`](crate::Error::Cancelled).
    pub cancellation: CancellationToken,
    /// Replaces [`PoolConfig::acquire_timeout`](crate::PoolConfig::acquire_timeout)
    /// for this call.
    pub acquire_timeout: Option<Duration>,
    /// Arbitrary key-value pairs for factory implementations.
    pub metadata: HashMap<String, String>,
}

impl Context {
    /// Create an empty context with a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default cancellation token with the provided one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Override the pool's acquisition timeout for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Add a key-value metadata pair to the context.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

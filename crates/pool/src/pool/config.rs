//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a [`Pool`](super::Pool). Fixed once the pool is built.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Idle-timeout eviction never drops the population below this count
    pub min_idle: usize,
    /// Maximum number of resources alive at once (idle + active + constructing)
    pub max_size: usize,
    /// How long `acquire` may wait, construction included
    pub acquire_timeout: Duration,
    /// Time after release after which an idle resource may be evicted
    pub idle_timeout: Duration,
    /// Maximum age of a resource; zero means unlimited
    pub max_lifetime: Duration,
    /// Period of the background reaper; `None` disables it
    pub reap_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle: 0,
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::ZERO,
            reap_interval: Some(Duration::from_secs(30)),
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::configuration("max_size must be greater than 0"));
        }
        if self.min_idle > self.max_size {
            return Err(Error::configuration(format!(
                "min_idle ({}) must not exceed max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(Error::configuration(
                "acquire_timeout must be greater than zero",
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(Error::configuration("idle_timeout must be greater than zero"));
        }
        if self.reap_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::configuration(
                "reap_interval must be greater than zero",
            ));
        }
        Ok(())
    }

    /// The lifetime limit, or `None` when resources may live forever.
    #[must_use]
    pub fn lifetime_limit(&self) -> Option<Duration> {
        (!self.max_lifetime.is_zero()).then_some(self.max_lifetime)
    }
}

//! # objpool
//!
//! A generic, concurrency-safe object pool for resources that are expensive
//! to build. Callers borrow resources from a [`Pool`] and hand them back
//! instead of constructing and discarding them; the pool enforces a maximum
//! size, an acquisition timeout, idle-timeout eviction with a minimum idle
//! floor, and a maximum lifetime.
//!
//! ```rust,ignore
//! let pool = Pool::new(MyFactory::default(), PoolConfig::default())?;
//! let conn = pool.acquire().await?;
//! // ...
//! pool.release(conn).await?;
//! ```

pub mod context;
pub mod error;
pub mod events;
pub mod factory;
pub mod guard;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod pool;

pub use context::Context;
pub use error::{Error, Result};
pub use events::{DestroyReason, EventBus, PoolEvent};
pub use factory::{Factory, Poolable};
pub use guard::Pooled;
pub use pool::{Pool, PoolConfig, PoolStats};

#[cfg(feature = "metrics")]
pub use metrics::{MetricsCollector, spawn_metrics_collector};

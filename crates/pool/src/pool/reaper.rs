//! Background task that sweeps a pool on a fixed period.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{PoolInner, deadline_after};
use crate::factory::Factory;

/// Spawn the reaper. It holds only a weak reference, so it never keeps a
/// pool alive; it exits on shutdown or once every pool handle is gone.
pub(super) fn spawn<F: Factory>(inner: &Arc<PoolInner<F>>, period: Duration) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let stop = inner.closed.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(deadline_after(Instant::now(), period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        #[cfg(feature = "tracing")]
        tracing::debug!(period_ms = period.as_millis() as u64, "Pool reaper started");

        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.sweep().await;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Pool reaper stopped");
    })
}

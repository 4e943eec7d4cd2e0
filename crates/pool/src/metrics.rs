//! Metrics collection for pool events.
//!
//! Subscribes to the [`EventBus`] and translates events into counters and
//! histograms via the `metrics` crate. Gated behind the `metrics` feature.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::events::{EventBus, PoolEvent};

/// Background metrics collector that subscribes to an [`EventBus`].
///
/// ```rust,ignore
/// let events = Arc::new(EventBus::default());
/// let pool = Pool::with_event_bus(factory, PoolConfig::default(), events.clone())?;
/// tokio::spawn(MetricsCollector::new(&events).run(CancellationToken::new()));
/// ```
pub struct MetricsCollector {
    receiver: broadcast::Receiver<PoolEvent>,
}

impl MetricsCollector {
    /// Create a new collector subscribed to the given event bus.
    #[must_use]
    pub fn new(event_bus: &EventBus) -> Self {
        Self {
            receiver: event_bus.subscribe(),
        }
    }

    /// Run until the bus is dropped or `cancel` fires. Lagged events are
    /// skipped with a warning.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                result = self.receiver.recv() => {
                    match result {
                        Ok(event) => Self::record_event(&event),
                        Err(broadcast::error::RecvError::Lagged(_n)) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(skipped = _n, "MetricsCollector lagged behind event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    }

    fn record_event(event: &PoolEvent) {
        match event {
            PoolEvent::Created { .. } => {
                metrics::counter!("pool.create.total").increment(1);
            }
            PoolEvent::Acquired { wait, .. } => {
                metrics::counter!("pool.acquire.total").increment(1);
                metrics::histogram!("pool.acquire.wait_seconds").record(wait.as_secs_f64());
            }
            PoolEvent::Released { held, .. } => {
                metrics::counter!("pool.release.total").increment(1);
                metrics::histogram!("pool.usage.duration_seconds").record(held.as_secs_f64());
            }
            PoolEvent::Destroyed { reason, .. } => {
                metrics::counter!("pool.destroy.total", "reason" => format!("{reason:?}"))
                    .increment(1);
            }
            PoolEvent::Exhausted { .. } => {
                metrics::counter!("pool.exhausted.total").increment(1);
            }
            PoolEvent::Error { .. } => {
                metrics::counter!("pool.error.total").increment(1);
            }
        }
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish()
    }
}

/// Create a [`MetricsCollector`] and spawn it as a background task.
pub fn spawn_metrics_collector(
    event_bus: &Arc<EventBus>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let collector = MetricsCollector::new(event_bus);
    tokio::spawn(collector.run(cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DestroyReason;
    use std::time::Duration;

    #[tokio::test]
    async fn collector_stops_when_bus_dropped() {
        let bus = Arc::new(EventBus::new(64));
        let handle = spawn_metrics_collector(&bus, CancellationToken::new());

        bus.emit(PoolEvent::Created { id: "1".into() });
        bus.emit(PoolEvent::Acquired {
            id: "1".into(),
            wait: Duration::from_millis(3),
        });
        bus.emit(PoolEvent::Destroyed {
            id: "1".into(),
            reason: DestroyReason::IdleTimeout,
        });

        drop(bus);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("collector should stop once the bus is gone")
            .unwrap();
    }
}

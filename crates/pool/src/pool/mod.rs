//! Generic object pool.
//!
//! [`Pool<F>`] hands out resources built by a [`Factory`], takes them back on
//! release, and enforces capacity, idle-timeout and lifetime policy.
//!
//! All bookkeeping sits behind a single `parking_lot::Mutex` that is never
//! held across an `.await`. The factory runs with the lock released: a slow
//! construction holds a reservation against `max_size` but does not stall
//! other callers acquiring or releasing.

mod config;
mod reaper;
mod state;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::events::{DestroyReason, EventBus, PoolEvent};
use crate::factory::{Factory, Poolable};
use crate::guard::Pooled;

pub use config::PoolConfig;
use state::{CheckIn, State};

/// Point-in-time view of a pool, taken under the pool lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Resources available for acquisition.
    pub idle: usize,
    /// Resources checked out to callers.
    pub active: usize,
    /// Constructions in flight.
    pub creating: usize,
    /// Callers blocked waiting for capacity.
    pub waiting: usize,
    /// Total successful acquisitions.
    pub total_acquisitions: u64,
    /// Total releases accepted by the pool.
    pub total_releases: u64,
    /// Total resources built by the factory and admitted.
    pub created: u64,
    /// Total resources removed from the pool.
    pub destroyed: u64,
    /// Destroy hooks that returned an error.
    pub destroy_failures: u64,
    /// Acquisitions that hit their deadline.
    pub timeouts: u64,
    /// Sum of acquisition latencies.
    pub total_wait: Duration,
    /// Longest acquisition latency seen.
    pub max_wait: Duration,
}

/// Shared state behind every [`Pool`] handle.
pub(crate) struct PoolInner<F: Factory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<State<F::Resource>>,
    /// Signalled whenever a resource or a unit of capacity frees up.
    available: Notify,
    events: Option<Arc<EventBus>>,
    /// Cancelled on shutdown; stops the reaper.
    closed: CancellationToken,
}

impl<F: Factory> PoolInner<F> {
    fn emit(&self, event: PoolEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    /// Run the factory's destroy hook. Failures are counted and logged.
    async fn destroy(&self, resource: F::Resource, reason: DestroyReason) {
        let id = resource.id().to_string();
        match self.factory.destroy(resource).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(id = %id, ?reason, "Destroyed pooled resource");
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(id = %id, ?reason, error = %e, "Failed to destroy pooled resource");
                self.state.lock().record_destroy_failure();
                self.emit(PoolEvent::Error {
                    id: id.clone(),
                    error: e.to_string(),
                });
            }
        }
        self.emit(PoolEvent::Destroyed { id, reason });
    }

    /// Destroy resources on a background task so the caller never waits on
    /// the factory's destroy hook. Without a runtime they are dropped.
    fn destroy_detached(self: &Arc<Self>, doomed: Vec<(F::Resource, DestroyReason)>) {
        if doomed.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(self);
                drop(handle.spawn(async move {
                    for (resource, reason) in doomed {
                        inner.destroy(resource, reason).await;
                    }
                }));
            }
            Err(_) => drop(doomed),
        }
    }

    async fn sweep(&self) -> usize {
        let evicted = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            state.sweep(Instant::now(), &self.config)
        };
        if evicted.is_empty() {
            return 0;
        }

        let count = evicted.len();
        #[cfg(feature = "tracing")]
        tracing::debug!(evicted = count, "Swept idle resources");
        self.available.notify_waiters();
        for (resource, reason) in evicted {
            self.destroy(resource, reason).await;
        }
        count
    }

    fn check_in(&self, resource: F::Resource) -> CheckIn<F::Resource> {
        let id = resource.id();
        let outcome =
            self.state
                .lock()
                .check_in(resource, Instant::now(), self.config.lifetime_limit());
        match &outcome {
            CheckIn::Idle { held } => {
                self.available.notify_one();
                #[cfg(feature = "tracing")]
                tracing::debug!(id = %id, held_ms = held.as_millis() as u64, "Released pooled resource");
                self.emit(PoolEvent::Released {
                    id: id.to_string(),
                    held: *held,
                });
            }
            CheckIn::Destroy(_, _reason) => {
                self.available.notify_one();
                #[cfg(feature = "tracing")]
                tracing::debug!(id = %id, reason = ?_reason, "Released resource leaves the pool");
            }
            CheckIn::Rejected(_) => {
                #[cfg(feature = "tracing")]
                tracing::error!(id = %id, "Release of a resource not checked out from this pool");
            }
        }
        outcome
    }

    fn timed_out(&self, timeout: Duration, waiting: bool) -> Error {
        let mut state = self.state.lock();
        state.record_timeout();
        let waiters = if waiting {
            state.waiting.saturating_sub(1)
        } else {
            state.waiting
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(timeout_ms = timeout.as_millis() as u64, waiters, "Acquire timed out");
        Error::Timeout {
            timeout_ms: timeout.as_millis() as u64,
            active: state.active_count(),
            max_size: self.config.max_size,
            waiters,
        }
    }
}

/// Stand-in for deadlines past what `Instant` can represent (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + after`, saturating to [`FAR_FUTURE`] so an unbounded timeout
/// such as `Duration::MAX` means "wait indefinitely".
pub(super) fn deadline_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Capacity held for a construction in flight.
///
/// Dropping an armed reservation (factory error, timeout, cancellation)
/// gives the capacity back and wakes a waiter.
struct Reservation<'a, F: Factory> {
    inner: &'a PoolInner<F>,
    armed: bool,
}

impl<'a, F: Factory> Reservation<'a, F> {
    /// Take one unit of capacity. Caller holds the lock.
    fn take(inner: &'a PoolInner<F>, state: &mut State<F::Resource>) -> Self {
        state.creating += 1;
        Self { inner, armed: true }
    }

    /// Hand the capacity over to the admitted resource. Caller holds the lock.
    fn settle(&mut self, state: &mut State<F::Resource>) {
        if self.armed {
            state.creating -= 1;
            self.armed = false;
        }
    }
}

impl<F: Factory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.state.lock().creating -= 1;
            self.inner.available.notify_one();
        }
    }
}

/// Registration of a blocked acquirer in the `waiting` gauge.
struct Waiter<'a, F: Factory> {
    inner: &'a PoolInner<F>,
}

impl<'a, F: Factory> Waiter<'a, F> {
    fn register(inner: &'a PoolInner<F>) -> (Self, usize) {
        let mut state = inner.state.lock();
        state.waiting += 1;
        (Self { inner }, state.waiting)
    }
}

impl<F: Factory> Drop for Waiter<'_, F> {
    fn drop(&mut self) {
        self.inner.state.lock().waiting -= 1;
    }
}

enum Step<'a, F: Factory> {
    Ready(F::Resource),
    Create(Reservation<'a, F>),
    Wait,
    Closed,
}

/// Generic resource pool.
///
/// Cheap to clone; clones share the same resources. See the module docs for
/// the locking discipline.
pub struct Pool<F: Factory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: Factory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Factory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F: Factory> fmt::Display for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (idle, active) = {
            let state = self.inner.state.lock();
            (state.idle_count(), state.active_count())
        };
        write!(f, "Pool[idle={idle}, active={active}]")
    }
}

impl<F: Factory> Pool<F> {
    /// Create a pool. When `config.reap_interval` is set and a tokio runtime
    /// is running, the background reaper starts immediately.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `config` is invalid.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self> {
        Self::build(factory, config, None)
    }

    /// Create a pool that publishes [`PoolEvent`]s on `events`.
    pub fn with_event_bus(factory: F, config: PoolConfig, events: Arc<EventBus>) -> Result<Self> {
        Self::build(factory, config, Some(events))
    }

    fn build(factory: F, config: PoolConfig, events: Option<Arc<EventBus>>) -> Result<Self> {
        config.validate()?;
        let pool = Self {
            inner: Arc::new(PoolInner {
                factory,
                state: Mutex::new(State::with_capacity(config.max_size)),
                config,
                available: Notify::new(),
                events,
                closed: CancellationToken::new(),
            }),
        };

        if let Some(period) = pool.inner.config.reap_interval {
            if tokio::runtime::Handle::try_current().is_ok() {
                drop(pool.spawn_reaper(period));
            } else {
                #[cfg(feature = "tracing")]
                tracing::debug!("No tokio runtime; background reaper not started");
            }
        }
        Ok(pool)
    }

    /// The configuration this pool was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Acquire a resource with the default context.
    pub async fn acquire(&self) -> Result<F::Resource> {
        self.acquire_with(&Context::default()).await
    }

    /// Acquire a resource.
    ///
    /// Takes an idle resource if there is one, builds a new one if the pool
    /// is below `max_size`, and otherwise waits for a release until the
    /// deadline (`ctx.acquire_timeout`, else the pool's `acquire_timeout`).
    /// Construction counts against the same deadline.
    ///
    /// The resource must be handed back with [`release`](Self::release).
    /// Dropping the returned future at any point leaks nothing. Expired idle
    /// resources met on the way are destroyed in the background, so a slow
    /// destroy hook never delays the caller.
    ///
    /// # Errors
    /// [`Error::Timeout`], [`Error::Cancelled`], [`Error::PoolClosed`], or
    /// whatever the factory returned.
    pub async fn acquire_with(&self, ctx: &Context) -> Result<F::Resource> {
        let inner = &*self.inner;
        let started = Instant::now();
        let timeout = ctx.acquire_timeout.unwrap_or(inner.config.acquire_timeout);
        let deadline = deadline_after(started, timeout);
        let lifetime = inner.config.lifetime_limit();
        let mut waiter = None;

        loop {
            // Register for wakeups before looking at the state so a release
            // landing in between is not missed.
            let notified = inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut expired = Vec::new();
            let step = {
                let mut state = inner.state.lock();
                if state.closed {
                    Step::Closed
                } else if let Some(resource) =
                    state.checkout_idle(Instant::now(), lifetime, &mut expired)
                {
                    state.record_acquisition(started.elapsed());
                    Step::Ready(resource)
                } else if state.population() < inner.config.max_size {
                    Step::Create(Reservation::take(inner, &mut state))
                } else {
                    Step::Wait
                }
            };

            // The checked-out resource must reach the caller before any await.
            self.inner.destroy_detached(
                expired
                    .into_iter()
                    .map(|resource| (resource, DestroyReason::Expired))
                    .collect(),
            );

            match step {
                Step::Closed => return Err(Error::PoolClosed),
                Step::Ready(resource) => return Ok(self.hand_off(resource, started)),
                Step::Create(reservation) => {
                    let resource = self.construct(ctx, started, deadline, reservation).await?;
                    return Ok(self.hand_off(resource, started));
                }
                Step::Wait => {
                    if waiter.is_none() {
                        let (registered, waiters) = Waiter::register(inner);
                        waiter = Some(registered);
                        #[cfg(feature = "tracing")]
                        tracing::debug!(waiters, "Pool exhausted, waiting for a release");
                        inner.emit(PoolEvent::Exhausted { waiters });
                    }
                    tokio::select! {
                        biased;
                        () = ctx.cancellation.cancelled() => return Err(Error::Cancelled),
                        () = notified.as_mut() => {}
                        () = tokio::time::sleep_until(deadline) => {
                            return Err(inner.timed_out(timeout, true));
                        }
                    }
                }
            }
        }
    }

    /// Run the factory for a reserved slot and admit the result as active.
    async fn construct(
        &self,
        ctx: &Context,
        started: Instant,
        deadline: Instant,
        mut reservation: Reservation<'_, F>,
    ) -> Result<F::Resource> {
        let inner = &*self.inner;
        let created = tokio::select! {
            biased;
            () = ctx.cancellation.cancelled() => return Err(Error::Cancelled),
            () = tokio::time::sleep_until(deadline) => {
                return Err(inner.timed_out(deadline - started, false));
            }
            result = inner.factory.create(ctx) => result,
        };
        let resource = match created {
            Ok(resource) => resource,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "Factory failed to create resource");
                return Err(e);
            }
        };

        let id = resource.id();
        let admitted = {
            let mut state = inner.state.lock();
            reservation.settle(&mut state);
            let admitted = state.admit_active(id.clone(), Instant::now());
            if admitted.is_ok() {
                state.record_acquisition(started.elapsed());
            }
            admitted
        };

        match admitted {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(id = %id, "Created pooled resource");
                inner.emit(PoolEvent::Created { id: id.to_string() });
                Ok(resource)
            }
            Err(reason) => {
                inner.available.notify_one();
                self.inner.destroy_detached(vec![(resource, reason)]);
                Err(match reason {
                    DestroyReason::Shutdown => Error::PoolClosed,
                    _ => Error::factory(format!("factory produced duplicate resource id '{id}'")),
                })
            }
        }
    }

    fn hand_off(&self, resource: F::Resource, started: Instant) -> F::Resource {
        let wait = started.elapsed();
        let id = resource.id();
        #[cfg(feature = "tracing")]
        tracing::debug!(id = %id, wait_ms = wait.as_millis() as u64, "Acquired pooled resource");
        self.inner.emit(PoolEvent::Acquired {
            id: id.to_string(),
            wait,
        });
        resource
    }

    /// Acquire a resource wrapped in a guard that releases it on drop.
    pub async fn get(&self) -> Result<Pooled<F>> {
        self.get_with(&Context::default()).await
    }

    /// [`acquire_with`](Self::acquire_with), wrapped in a [`Pooled`] guard.
    pub async fn get_with(&self, ctx: &Context) -> Result<Pooled<F>> {
        let resource = self.acquire_with(ctx).await?;
        Ok(Pooled::new(resource, self.clone()))
    }

    /// Hand a checked-out resource back.
    ///
    /// The resource becomes idle, or is destroyed if it has outlived
    /// `max_lifetime` or the pool has been shut down.
    ///
    /// # Errors
    /// [`Error::InvalidResource`] if the resource is not checked out from
    /// this pool (never acquired, or already released). The rejected
    /// instance is dropped without running the factory's destroy hook.
    pub async fn release(&self, resource: F::Resource) -> Result<()> {
        match self.inner.check_in(resource) {
            CheckIn::Idle { .. } => Ok(()),
            CheckIn::Destroy(resource, reason) => {
                self.inner.destroy(resource, reason).await;
                Ok(())
            }
            CheckIn::Rejected(resource) => Err(Error::InvalidResource {
                id: resource.id().to_string(),
            }),
        }
    }

    /// Release from a synchronous context (guard drop). Destruction, if
    /// needed, is spawned onto the current runtime.
    pub(crate) fn release_detached(&self, resource: F::Resource) {
        if let CheckIn::Destroy(resource, reason) = self.inner.check_in(resource) {
            self.inner.destroy_detached(vec![(resource, reason)]);
        }
    }

    /// Current idle/active counts and lifetime counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.state.lock().snapshot()
    }

    /// Evict idle resources past `idle_timeout` (down to `min_idle`) or past
    /// `max_lifetime`. Returns how many were evicted.
    ///
    /// The background reaper calls this every `reap_interval`.
    pub async fn sweep(&self) -> usize {
        self.inner.sweep().await
    }

    /// Build idle resources until the population reaches `min_idle`.
    /// Returns how many were built.
    ///
    /// # Errors
    /// The first factory error, or [`Error::PoolClosed`].
    pub async fn warm_up(&self) -> Result<usize> {
        let inner = &*self.inner;
        let ctx = Context::default();
        let mut built = 0;
        loop {
            let mut reservation = {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(Error::PoolClosed);
                }
                if state.population() >= inner.config.min_idle {
                    break;
                }
                Reservation::take(inner, &mut state)
            };

            let resource = inner.factory.create(&ctx).await?;
            let id = resource.id();
            let admitted = {
                let mut state = inner.state.lock();
                reservation.settle(&mut state);
                state.admit_idle(resource, Instant::now())
            };
            inner.available.notify_one();
            match admitted {
                Ok(()) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(id = %id, "Created idle resource during warm-up");
                    inner.emit(PoolEvent::Created { id: id.to_string() });
                    built += 1;
                }
                Err((resource, reason)) => {
                    inner.destroy(resource, reason).await;
                    return Err(match reason {
                        DestroyReason::Shutdown => Error::PoolClosed,
                        _ => Error::factory(format!("factory produced duplicate resource id '{id}'")),
                    });
                }
            }
        }
        Ok(built)
    }

    /// Start a reaper that sweeps every `period` until the pool shuts down
    /// or its last handle is dropped.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn spawn_reaper(&self, period: Duration) -> JoinHandle<()> {
        reaper::spawn(&self.inner, period)
    }

    /// Close the pool.
    ///
    /// Idle resources are destroyed, blocked acquirers fail with
    /// [`Error::PoolClosed`], new acquisitions are refused, and resources
    /// still checked out are destroyed when released. Calling it again is a
    /// no-op.
    pub async fn shutdown(&self) {
        let inner = &*self.inner;
        let drained = {
            let mut state = inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.drain_idle()
        };
        inner.closed.cancel();
        inner.available.notify_waiters();

        #[cfg(feature = "tracing")]
        tracing::debug!(idle = drained.len(), "Pool shutting down");
        for resource in drained {
            inner.destroy(resource, DestroyReason::Shutdown).await;
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

//! Pool bookkeeping: an arena of slots, an idle free-list and an identity index.
//!
//! Every method here runs under the pool lock and never blocks or awaits.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use super::{PoolConfig, PoolStats};
use crate::events::DestroyReason;
use crate::factory::Poolable;

/// One pooled resource and its timestamps.
struct Slot<R: Poolable> {
    id: R::Id,
    /// `Some` while idle, `None` while checked out.
    resource: Option<R>,
    created_at: Instant,
    released_at: Instant,
    acquired_at: Instant,
}

impl<R: Poolable> Slot<R> {
    fn is_expired(&self, now: Instant, lifetime: Option<Duration>) -> bool {
        lifetime.is_some_and(|limit| now.duration_since(self.created_at) > limit)
    }
}

/// Outcome of handing a resource back to the pool.
pub(crate) enum CheckIn<R> {
    /// The resource is idle again.
    Idle { held: Duration },
    /// The resource left the pool and must be destroyed.
    Destroy(R, DestroyReason),
    /// The resource is not checked out from this pool.
    Rejected(R),
}

pub(crate) struct State<R: Poolable> {
    slots: Vec<Option<Slot<R>>>,
    vacant: Vec<usize>,
    /// Slots holding idle resources, oldest release at the front.
    idle: VecDeque<usize>,
    /// Identity index over every pooled resource, idle or active.
    index: HashMap<R::Id, usize>,
    /// Constructions in flight; they count against `max_size`.
    pub(crate) creating: usize,
    /// Callers blocked on capacity.
    pub(crate) waiting: usize,
    pub(crate) closed: bool,
    counters: PoolStats,
}

impl<R: Poolable> State<R> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            vacant: Vec::new(),
            idle: VecDeque::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            creating: 0,
            waiting: 0,
            closed: false,
            counters: PoolStats::default(),
        }
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.index.len() - self.idle.len()
    }

    /// Resources alive or being built.
    pub(crate) fn population(&self) -> usize {
        self.index.len() + self.creating
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            idle: self.idle_count(),
            active: self.active_count(),
            creating: self.creating,
            waiting: self.waiting,
            ..self.counters.clone()
        }
    }

    pub(crate) fn record_acquisition(&mut self, wait: Duration) {
        self.counters.total_acquisitions += 1;
        self.counters.total_wait += wait;
        self.counters.max_wait = self.counters.max_wait.max(wait);
    }

    pub(crate) fn record_timeout(&mut self) {
        self.counters.timeouts += 1;
    }

    pub(crate) fn record_destroy_failure(&mut self) {
        self.counters.destroy_failures += 1;
    }

    /// Move the most recently released idle resource to active.
    ///
    /// Idle resources past their lifetime met on the way are removed and
    /// pushed onto `expired`.
    pub(crate) fn checkout_idle(
        &mut self,
        now: Instant,
        lifetime: Option<Duration>,
        expired: &mut Vec<R>,
    ) -> Option<R> {
        while let Some(idx) = self.idle.pop_back() {
            let Some(slot) = self.slots.get_mut(idx).and_then(Option::as_mut) else {
                continue;
            };
            if slot.is_expired(now, lifetime) {
                expired.extend(self.vacate(idx));
                continue;
            }
            if let Some(resource) = slot.resource.take() {
                slot.acquired_at = now;
                return Some(resource);
            }
        }
        None
    }

    /// Register a freshly built resource that goes straight to its caller.
    pub(crate) fn admit_active(&mut self, id: R::Id, now: Instant) -> Result<(), DestroyReason> {
        self.admissible(&id)?;
        self.occupy(Slot {
            id,
            resource: None,
            created_at: now,
            released_at: now,
            acquired_at: now,
        });
        Ok(())
    }

    /// Register a freshly built resource as idle.
    pub(crate) fn admit_idle(&mut self, resource: R, now: Instant) -> Result<(), (R, DestroyReason)> {
        let id = resource.id();
        if let Err(reason) = self.admissible(&id) {
            return Err((resource, reason));
        }
        let idx = self.occupy(Slot {
            id,
            resource: Some(resource),
            created_at: now,
            released_at: now,
            acquired_at: now,
        });
        self.idle.push_back(idx);
        Ok(())
    }

    fn admissible(&self, id: &R::Id) -> Result<(), DestroyReason> {
        if self.closed {
            return Err(DestroyReason::Shutdown);
        }
        if self.index.contains_key(id) {
            return Err(DestroyReason::Rejected);
        }
        Ok(())
    }

    fn occupy(&mut self, slot: Slot<R>) -> usize {
        let id = slot.id.clone();
        let idx = match self.vacant.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, idx);
        self.counters.created += 1;
        idx
    }

    /// Free a slot, returning the resource if it was idle.
    fn vacate(&mut self, idx: usize) -> Option<R> {
        let slot = self.slots.get_mut(idx)?.take()?;
        self.index.remove(&slot.id);
        self.vacant.push(idx);
        self.counters.destroyed += 1;
        slot.resource
    }

    /// Move an active resource back to idle, or out of the pool if it has
    /// outlived `lifetime` or the pool is closed.
    pub(crate) fn check_in(
        &mut self,
        resource: R,
        now: Instant,
        lifetime: Option<Duration>,
    ) -> CheckIn<R> {
        let Some(&idx) = self.index.get(&resource.id()) else {
            return CheckIn::Rejected(resource);
        };
        let Some(slot) = self.slots.get_mut(idx).and_then(Option::as_mut) else {
            return CheckIn::Rejected(resource);
        };
        if slot.resource.is_some() {
            // Already idle.
            return CheckIn::Rejected(resource);
        }

        self.counters.total_releases += 1;
        let held = now.duration_since(slot.acquired_at);
        let reason = if self.closed {
            Some(DestroyReason::Shutdown)
        } else if slot.is_expired(now, lifetime) {
            Some(DestroyReason::Expired)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                self.vacate(idx);
                CheckIn::Destroy(resource, reason)
            }
            None => {
                slot.resource = Some(resource);
                slot.released_at = now;
                self.idle.push_back(idx);
                CheckIn::Idle { held }
            }
        }
    }

    /// Evict idle resources past their lifetime or idle timeout.
    ///
    /// Lifetime expiry is unconditional. Idle-timeout eviction stops once the
    /// population would fall below `min_idle`; the eligible resources that
    /// have been idle longest are the ones retained.
    pub(crate) fn sweep(&mut self, now: Instant, config: &PoolConfig) -> Vec<(R, DestroyReason)> {
        let lifetime = config.lifetime_limit();
        let mut expired = Vec::new();
        let mut stale = Vec::new();
        for &idx in &self.idle {
            let Some(slot) = self.slots.get(idx).and_then(Option::as_ref) else {
                continue;
            };
            if slot.is_expired(now, lifetime) {
                expired.push(idx);
            } else if now.duration_since(slot.released_at) > config.idle_timeout {
                stale.push((slot.released_at, idx));
            }
        }

        let evictable = (self.population() - expired.len()).saturating_sub(config.min_idle);
        stale.sort_by_key(|&(released_at, _)| released_at);
        let retained = stale.len().saturating_sub(evictable);
        let stale: Vec<usize> = stale.into_iter().skip(retained).map(|(_, idx)| idx).collect();

        if expired.is_empty() && stale.is_empty() {
            return Vec::new();
        }
        self.idle
            .retain(|idx| !expired.contains(idx) && !stale.contains(idx));

        let mut evicted = Vec::with_capacity(expired.len() + stale.len());
        for idx in expired {
            evicted.extend(self.vacate(idx).map(|r| (r, DestroyReason::Expired)));
        }
        for idx in stale {
            evicted.extend(self.vacate(idx).map(|r| (r, DestroyReason::IdleTimeout)));
        }
        evicted
    }

    /// Remove every idle resource.
    pub(crate) fn drain_idle(&mut self) -> Vec<R> {
        let drained: Vec<usize> = self.idle.drain(..).collect();
        drained.into_iter().filter_map(|idx| self.vacate(idx)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Item(u32);

    impl Poolable for Item {
        type Id = u32;

        fn id(&self) -> u32 {
            self.0
        }
    }

    fn config(min_idle: usize, idle_timeout: Duration) -> PoolConfig {
        PoolConfig {
            min_idle,
            max_size: 8,
            idle_timeout,
            reap_interval: None,
            ..Default::default()
        }
    }

    fn idle_state(ids: &[u32], now: Instant) -> State<Item> {
        let mut state = State::with_capacity(8);
        for &id in ids {
            assert!(state.admit_idle(Item(id), now).is_ok());
        }
        state
    }

    #[test]
    fn checkout_prefers_most_recently_released() {
        let now = Instant::now();
        let mut state = idle_state(&[1, 2, 3], now);
        let mut expired = Vec::new();

        let item = state.checkout_idle(now, None, &mut expired).unwrap();
        assert_eq!(item, Item(3));
        assert_eq!(state.idle_count(), 2);
        assert_eq!(state.active_count(), 1);
        assert!(expired.is_empty());
    }

    #[test]
    fn checkout_skips_lifetime_expired_idle() {
        let start = Instant::now();
        let mut state = idle_state(&[1], start);
        let later = start + Duration::from_secs(10);
        let mut expired = Vec::new();

        assert!(state.checkout_idle(later, Some(Duration::from_secs(5)), &mut expired).is_none());
        assert_eq!(expired, vec![Item(1)]);
        assert_eq!(state.population(), 0);
        assert_eq!(state.snapshot().destroyed, 1);
    }

    #[test]
    fn check_in_rejects_unknown_and_idle() {
        let now = Instant::now();
        let mut state = idle_state(&[1], now);

        assert!(matches!(state.check_in(Item(9), now, None), CheckIn::Rejected(Item(9))));
        // Item 1 is idle, so handing it back again is a double release.
        assert!(matches!(state.check_in(Item(1), now, None), CheckIn::Rejected(Item(1))));
        assert_eq!(state.snapshot().total_releases, 0);
    }

    #[test]
    fn check_in_round_trip() {
        let now = Instant::now();
        let mut state = State::<Item>::with_capacity(2);
        state.admit_active(4, now).unwrap();
        assert_eq!(state.active_count(), 1);

        let later = now + Duration::from_millis(30);
        match state.check_in(Item(4), later, None) {
            CheckIn::Idle { held } => assert_eq!(held, Duration::from_millis(30)),
            _ => panic!("expected the resource to go idle"),
        }
        assert_eq!(state.idle_count(), 1);
        assert_eq!(state.active_count(), 0);
    }

    #[test]
    fn check_in_destroys_after_close() {
        let now = Instant::now();
        let mut state = State::<Item>::with_capacity(2);
        state.admit_active(4, now).unwrap();
        state.closed = true;

        assert!(matches!(
            state.check_in(Item(4), now, None),
            CheckIn::Destroy(Item(4), DestroyReason::Shutdown)
        ));
        assert_eq!(state.population(), 0);
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let now = Instant::now();
        let mut state = idle_state(&[1], now);
        assert_eq!(state.admit_active(1, now), Err(DestroyReason::Rejected));
        assert!(matches!(
            state.admit_idle(Item(1), now),
            Err((Item(1), DestroyReason::Rejected))
        ));
    }

    #[test]
    fn vacant_slots_are_reused() {
        let now = Instant::now();
        let mut state = idle_state(&[1, 2], now);
        assert_eq!(state.drain_idle().len(), 2);
        state.admit_active(3, now).unwrap();
        state.admit_active(4, now).unwrap();
        assert_eq!(state.slots.len(), 2);
    }

    #[test]
    fn sweep_keeps_longest_idle_for_min_idle() {
        let start = Instant::now();
        let mut state = State::with_capacity(8);
        for (offset, id) in [(0, 1), (1, 2), (2, 3)] {
            state
                .admit_idle(Item(id), start + Duration::from_secs(offset))
                .unwrap();
        }

        let now = start + Duration::from_secs(100);
        let evicted = state.sweep(now, &config(2, Duration::from_secs(10)));

        assert_eq!(evicted.len(), 1);
        assert!(matches!(evicted[0], (Item(3), DestroyReason::IdleTimeout)));
        assert_eq!(state.idle_count(), 2);
    }

    #[test]
    fn sweep_ignores_fresh_idle() {
        let now = Instant::now();
        let mut state = idle_state(&[1, 2], now);
        let evicted = state.sweep(now + Duration::from_secs(5), &config(0, Duration::from_secs(10)));
        assert!(evicted.is_empty());
        assert_eq!(state.idle_count(), 2);
    }

    #[test]
    fn sweep_counts_active_toward_min_idle() {
        let now = Instant::now();
        let mut state = idle_state(&[1], now);
        state.admit_active(2, now).unwrap();

        // Population is 2, minimum is 2: nothing may go.
        let evicted = state.sweep(now + Duration::from_secs(60), &config(2, Duration::from_secs(10)));
        assert!(evicted.is_empty());
        assert_eq!(state.active_count(), 1);
    }

    #[test]
    fn sweep_evicts_lifetime_expired_regardless_of_min_idle() {
        let now = Instant::now();
        let mut state = idle_state(&[1, 2], now);
        let config = PoolConfig {
            max_lifetime: Duration::from_secs(30),
            ..config(2, Duration::from_secs(600))
        };

        let evicted = state.sweep(now + Duration::from_secs(31), &config);
        assert_eq!(evicted.len(), 2);
        assert!(evicted.iter().all(|(_, reason)| *reason == DestroyReason::Expired));
        assert_eq!(state.population(), 0);
    }
}

//! Factory failures propagate to the acquirer and leave the pool untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use objpool::context::Context;
use objpool::error::{Error, Result};
use objpool::factory::{Factory, Poolable};
use objpool::pool::{Pool, PoolConfig};

#[derive(Debug, PartialEq, Eq)]
struct Link(u64);

impl Poolable for Link {
    type Id = u64;

    fn id(&self) -> u64 {
        self.0
    }
}

/// Fails while `failing` is set.
struct FlakyFactory {
    next: AtomicU64,
    failing: Arc<AtomicBool>,
}

impl Factory for FlakyFactory {
    type Resource = Link;

    async fn create(&self, _ctx: &Context) -> Result<Link> {
        if self.failing.load(Ordering::SeqCst) {
            let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "link down");
            return Err(Error::factory_with_source(io));
        }
        Ok(Link(self.next.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Always hands out the same identifier.
struct StuckFactory;

impl Factory for StuckFactory {
    type Resource = Link;

    async fn create(&self, _ctx: &Context) -> Result<Link> {
        Ok(Link(7))
    }
}

fn config(max_size: usize) -> PoolConfig {
    PoolConfig {
        max_size,
        acquire_timeout: Duration::from_millis(200),
        reap_interval: None,
        ..Default::default()
    }
}

#[tokio::test]
async fn factory_error_reaches_caller_unchanged() {
    let failing = Arc::new(AtomicBool::new(true));
    let factory = FlakyFactory {
        next: AtomicU64::new(0),
        failing: Arc::clone(&failing),
    };
    let pool = Pool::new(factory, config(1)).unwrap();

    let err = pool.acquire().await.unwrap_err();
    match &err {
        Error::Factory { reason, source } => {
            assert_eq!(reason, "link down");
            assert!(source.is_some());
        }
        other => panic!("expected Factory error, got: {other:?}"),
    }
    assert!(!err.is_retryable());

    let stats = pool.stats();
    assert_eq!((stats.idle, stats.active, stats.creating), (0, 0, 0));
    assert_eq!(stats.created, 0);
    assert_eq!(stats.total_acquisitions, 0);
}

#[tokio::test]
async fn capacity_is_available_again_after_factory_error() {
    let failing = Arc::new(AtomicBool::new(true));
    let factory = FlakyFactory {
        next: AtomicU64::new(0),
        failing: Arc::clone(&failing),
    };
    // max_size 1: a leaked reservation would make the next acquire time out.
    let pool = Pool::new(factory, config(1)).unwrap();

    for _ in 0..3 {
        assert!(matches!(pool.acquire().await, Err(Error::Factory { .. })));
    }

    failing.store(false, Ordering::SeqCst);
    let link = pool.acquire().await.expect("capacity should not have leaked");
    assert_eq!(link, Link(0));
}

#[tokio::test]
async fn warm_up_propagates_factory_error() {
    let factory = FlakyFactory {
        next: AtomicU64::new(0),
        failing: Arc::new(AtomicBool::new(true)),
    };
    let pool = Pool::new(
        factory,
        PoolConfig {
            min_idle: 2,
            ..config(2)
        },
    )
    .unwrap();

    assert!(matches!(pool.warm_up().await, Err(Error::Factory { .. })));
    assert_eq!(pool.stats().creating, 0);
}

#[tokio::test]
async fn duplicate_identifier_from_factory_is_refused() {
    let pool = Pool::new(StuckFactory, config(2)).unwrap();

    let first = pool.acquire().await.unwrap();
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::Factory { .. }), "got: {err:?}");

    let stats = pool.stats();
    assert_eq!(stats.active, 1);
    assert_eq!(stats.creating, 0);

    pool.release(first).await.unwrap();
    assert_eq!(pool.stats().idle, 1);
}

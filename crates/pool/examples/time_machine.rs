//! Borrow and return expensive "time machines" and print the pool state.
//!
//! ```sh
//! RUST_LOG=objpool=debug cargo run -p objpool --example time_machine
//! ```

use std::time::Duration;

use objpool::{Context, Factory, Pool, PoolConfig, Poolable, Result};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug)]
struct TimeMachine {
    id: Uuid,
}

impl Poolable for TimeMachine {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }
}

struct TimeMachineFactory;

impl Factory for TimeMachineFactory {
    type Resource = TimeMachine;

    async fn create(&self, _ctx: &Context) -> Result<TimeMachine> {
        // Really expensive.
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(TimeMachine { id: Uuid::new_v4() })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PoolConfig {
        max_size: 3,
        acquire_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let pool = Pool::new(TimeMachineFactory, config)?;
    tracing::info!("{pool}");

    let first = pool.acquire().await?;
    tracing::info!("{pool}");
    let second = pool.acquire().await?;
    tracing::info!("{pool}");
    let third = pool.acquire().await?;
    tracing::info!("{pool}");

    pool.release(first).await?;
    tracing::info!("{pool}");
    pool.release(second).await?;
    tracing::info!("{pool}");

    let fourth = pool.acquire().await?;
    tracing::info!("{pool}");
    let fifth = pool.acquire().await?;
    tracing::info!("{pool}");

    pool.release(fifth).await?;
    tracing::info!("{pool}");

    let stats = pool.stats();
    tracing::info!(
        created = stats.created,
        acquisitions = stats.total_acquisitions,
        max_wait_ms = stats.max_wait.as_millis() as u64,
        "done"
    );

    drop((third, fourth));
    pool.shutdown().await;
    Ok(())
}

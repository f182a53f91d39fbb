//! A bounded, concurrent pool of long-lived connections.

pub(crate) mod idle;
pub(crate) mod inner;
mod janitor;

use std::sync::Arc;

use crate::config::PoolConfig;
use crate::error::Result;
use crate::factory::ConnectionFactory;
use crate::health::{HealthProbe, NoopProbe};
use crate::proxy::PooledConnection;
use crate::raw::RawConnection;
use inner::PoolInner;

/// The public pool facade.
///
/// Grounded on `pool/mod.rs`'s `Pool<DB>(Arc<SharedPool<DB>>)`: a thin,
/// cheaply cloneable handle around the shared state in [`inner::PoolInner`].
pub struct Pool<C: RawConnection> {
    inner: Arc<PoolInner<C>>,
    janitor: Arc<tokio::task::JoinHandle<()>>,
}

impl<C: RawConnection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            janitor: self.janitor.clone(),
        }
    }
}

impl<C: RawConnection> Pool<C> {
    /// Builds a pool, eagerly filling it to `config.init_size` and starting
    /// the background janitor task.
    ///
    /// Grounded on `PoolOptions::connect` (`pool/options.rs`): the initial
    /// fill failing to reach `init_size` is logged, not fatal — the pool is
    /// still usable and growth continues on demand.
    pub async fn connect(
        config: PoolConfig,
        factory: impl ConnectionFactory<C>,
        probe: impl HealthProbe<C>,
    ) -> Result<Self> {
        config.validate()?;
        let inner = Arc::new(PoolInner::new(config, factory, probe));

        let init_size = inner.config.init_size;
        for _ in 0..init_size {
            if let Err(e) = inner.add_one().await {
                tracing::warn!(error = %e, "initial connection fill attempt failed");
            }
        }
        if inner.total() < init_size {
            tracing::warn!(
                total = inner.total(),
                init_size,
                "pool did not reach init_size during construction"
            );
        }

        let janitor = janitor::spawn(inner.clone());

        Ok(Self {
            inner,
            janitor: Arc::new(janitor),
        })
    }

    /// Builds a pool without a custom probe, relying on `config.test_connection`
    /// alone (a no-op probe when it's disabled, matching the source's
    /// "skip the hot-path liveness check" default).
    pub async fn connect_with_factory(
        config: PoolConfig,
        factory: impl ConnectionFactory<C>,
    ) -> Result<Self> {
        Self::connect(config, factory, NoopProbe).await
    }

    /// Checks out a connection, waiting up to `config.acquire_timeout` for
    /// one to become available and growing the pool on demand.
    pub async fn acquire(&self) -> Result<PooledConnection<C>> {
        self.inner.acquire().await
    }

    /// Connections currently idle in the pool.
    pub fn idle_connections(&self) -> u32 {
        self.inner.idle_count()
    }

    /// Connections currently checked out.
    pub fn active_connections(&self) -> u32 {
        self.inner.total().saturating_sub(self.inner.idle_count())
    }

    /// All connections tracked by the pool, idle or checked out.
    pub fn total_connections(&self) -> u32 {
        self.inner.total()
    }

    /// Drains and closes every idle connection and marks the pool closed
    /// so future releases are discarded rather than re-enqueued.
    ///
    /// Checked-out connections are left alone; see `close` for a variant
    /// that waits for them.
    pub async fn shutdown_idle(&self) {
        self.inner.shutdown_idle().await;
    }

    /// Closes the pool: drains idle connections immediately, then waits
    /// for every checked-out connection to be released (discarding each as
    /// it comes back) before returning.
    pub async fn close(&self) {
        self.inner.shutdown_idle().await;
        while self.inner.total() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }
}

impl<C: RawConnection> Drop for Pool<C> {
    fn drop(&mut self) {
        // Only the last handle (this `Arc` plus the one held by the
        // janitor task) should stop the background task; `Arc::strong_count`
        // is a heuristic here, acceptable because the janitor holds no
        // handle capable of recreating the pool.
        if Arc::strong_count(&self.janitor) == 1 {
            self.janitor.abort();
        }
    }
}

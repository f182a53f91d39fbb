use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::factory::ConnectionFactory;
use crate::health::HealthProbe;
use crate::pool::idle::IdleQueue;
use crate::proxy::{Idle, Live, PooledConnection, SizeGuard};
use crate::raw::RawConnection;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe adapter over [`ConnectionFactory`], so `PoolInner` can hold
/// it behind `Arc<dyn ...>` instead of threading a generic factory type
/// parameter through every pool type.
///
/// Grounded on `pool/connect.rs`'s `DynConnector<DB>`, which wraps
/// `Arc<dyn PoolConnector<DB>>` the same way for the same reason (RPITIT
/// traits aren't themselves object-safe).
trait DynConnectionFactory<C>: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<C>>;
}

impl<C, F> DynConnectionFactory<C> for F
where
    C: RawConnection,
    F: ConnectionFactory<C>,
{
    fn connect(&self) -> BoxFuture<'_, Result<C>> {
        Box::pin(ConnectionFactory::connect(self))
    }
}

trait DynHealthProbe<C>: Send + Sync {
    fn check<'a>(&'a self, conn: &'a mut C) -> BoxFuture<'a, bool>;
}

impl<C, H> DynHealthProbe<C> for H
where
    C: RawConnection,
    H: HealthProbe<C>,
{
    fn check<'a>(&'a self, conn: &'a mut C) -> BoxFuture<'a, bool> {
        Box::pin(HealthProbe::check(self, conn))
    }
}

/// Shared pool state. Every [`PooledConnection`] holds an `Arc` to this so
/// it can call back into the pool on release without a true weak
/// back-reference (Rust's ownership rules make `Arc` to the parent safe
/// here: the pool's state always outlives every connection it created).
///
/// Grounded on the `SharedPool<DB>` (`pool/inner.rs`) / `PoolInner`
/// (`pool/conn.rs`) generations, fused: atomic `size`/`closed` plus a
/// serialized `try_grow`, matching the source's description of a single
/// writer for pool growth.
pub(crate) struct PoolInner<C: RawConnection> {
    pub(crate) config: PoolConfig,
    pub(crate) idle: IdleQueue<C>,
    pub(crate) size: AtomicU32,
    closed: AtomicBool,
    latest_error: Mutex<Option<Arc<Error>>>,
    grow_lock: AsyncMutex<()>,
    factory: Arc<dyn DynConnectionFactory<C>>,
    probe: Arc<dyn DynHealthProbe<C>>,
}

impl<C: RawConnection> PoolInner<C> {
    pub(crate) fn new(
        config: PoolConfig,
        factory: impl ConnectionFactory<C>,
        probe: impl HealthProbe<C>,
    ) -> Self {
        Self {
            idle: IdleQueue::new(config.max_size),
            size: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            latest_error: Mutex::new(None),
            grow_lock: AsyncMutex::new(()),
            factory: Arc::new(factory),
            probe: Arc::new(probe),
            config,
        }
    }

    pub(crate) fn total(&self) -> u32 {
        self.size.load(Ordering::Acquire)
    }

    pub(crate) fn idle_count(&self) -> u32 {
        self.idle.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn record_error(&self, err: &Error) {
        let mut slot = self.latest_error.lock().expect("latest_error mutex poisoned");
        *slot = Some(Arc::new(match err {
            Error::DriverError(e) => Error::DriverError(e.clone()),
            Error::TransportFatal(e) => Error::TransportFatal(e.clone()),
            Error::Transient(e) => Error::Transient(e.clone()),
            other => Error::ConfigInvalid(other.to_string()),
        }));
    }

    fn latest_error(&self) -> Option<Arc<Error>> {
        self.latest_error
            .lock()
            .expect("latest_error mutex poisoned")
            .clone()
    }

    /// Opens and admits up to `config.increment` new connections, subject
    /// to `total < max_size`. Serialized by `grow_lock` so concurrent
    /// exhausted acquirers don't collectively overshoot `max_size`.
    ///
    /// Grounded on `pool/connect.rs`'s retry-with-sleep structure,
    /// simplified to the spec's flat `retry_interval` (no backoff/jitter).
    pub(crate) async fn try_grow(self: &Arc<Self>) {
        let _permit = self.grow_lock.lock().await;

        for _ in 0..self.config.increment {
            if self.total() >= self.config.max_size {
                break;
            }
            if self.add_one().await.is_err() {
                // `add_one` already recorded the error; give the caller's
                // own wait loop a chance to observe it instead of busy
                // retrying inside the grow lock.
                break;
            }
        }
    }

    /// Opens a single new connection with up to `config.retries` attempts,
    /// validating it with the health probe before admitting it to the
    /// idle queue.
    ///
    /// `pub(crate)` so `Pool::connect`'s initial fill can call it directly,
    /// one connection per `init_size` slot, rather than going through
    /// `try_grow` (which admits up to `increment` connections per call and
    /// would overshoot `init_size` when `increment > 1`).
    pub(crate) async fn add_one(self: &Arc<Self>) -> Result<()> {
        let guard = SizeGuard::new(self.clone());
        self.size.fetch_add(1, Ordering::AcqRel);

        let mut last_err = None;
        for attempt in 0..self.config.retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_interval).await;
            }

            match self.factory.connect().await {
                Ok(mut raw) => {
                    let healthy = if self.config.test_connection {
                        self.probe.check(&mut raw).await
                    } else {
                        true
                    };

                    if !healthy {
                        tracing::warn!(attempt, "newly opened connection failed health probe");
                        last_err = Some(Error::ConfigInvalid(
                            "connection failed health probe".into(),
                        ));
                        continue;
                    }

                    let live = Live {
                        raw,
                        created: Instant::now(),
                    };
                    let idle = Idle {
                        live,
                        since: Instant::now(),
                    };

                    if let Err(_rejected) = self.idle.put(idle) {
                        tracing::warn!("idle queue full during admission, discarding connection");
                        return Err(Error::ConfigInvalid("idle queue at capacity".into()));
                    }

                    guard.disarm();
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "connection attempt failed");
                    self.record_error(&e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(Error::ConfigInvalid("connection attempts exhausted".into())))
    }

    /// Pops an idle connection, growing the pool first if it's empty,
    /// honoring `acquire_timeout` and discarding/replacing connections
    /// that have exceeded `max_lifetime`.
    ///
    /// Grounded on `SharedPool::acquire`'s loop (`pool/inner.rs`): check
    /// size, wait with a shrinking timeout budget, reap aged connections
    /// before handing them back.
    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<PooledConnection<C>> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let deadline = Instant::now() + self.config.acquire_timeout;

        loop {
            if self.idle_count() == 0 && self.total() < self.config.max_size {
                self.try_grow().await;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(idle) = self.idle.get(remaining).await else {
                return Err(Error::PoolExhausted {
                    idle: self.idle_count(),
                    total: self.total(),
                    max: self.config.max_size,
                    last_error: self.latest_error(),
                });
            };

            if let Some(max_lifetime) = self.config.max_lifetime {
                if idle.live.created.elapsed() > max_lifetime {
                    self.terminate(idle.live).await;
                    continue;
                }
            }

            let mut live = idle.live;

            if self.config.test_before_acquire {
                let healthy = self.probe.check(&mut live.raw).await;
                if !healthy {
                    self.terminate(live).await;
                    continue;
                }
            }

            return Ok(PooledConnection::new(live, self.clone()));
        }
    }

    /// Closes a connection's raw transport and decrements the size
    /// counter. Used for evicted/aged/unhealthy connections.
    pub(crate) async fn terminate(&self, live: Live<C>) {
        self.size.fetch_sub(1, Ordering::AcqRel);
        if let Err(e) = live.raw.close().await {
            tracing::debug!(error = %e, "error closing discarded connection");
        }
    }

    /// Returns a checked-out connection to the pool: re-enqueues it if it's
    /// healthy and the pool is open, otherwise terminates it.
    pub(crate) async fn release(&self, mut live: Live<C>, force_closed: bool) {
        if force_closed || self.is_closed() {
            self.size.fetch_sub(1, Ordering::AcqRel);
            if let Err(e) = live.raw.close().await {
                tracing::debug!(error = %e, "error closing released connection");
            }
            return;
        }

        let idle = Idle {
            live,
            since: Instant::now(),
        };

        if let Err(rejected) = self.idle.put(idle) {
            // The bounded queue should never be full given size accounting
            // keeps `total <= max_size`; treat it as a (logged) invariant
            // violation and fail safe by discarding the connection.
            tracing::warn!("idle queue unexpectedly full on release, discarding connection");
            self.size.fetch_sub(1, Ordering::AcqRel);
            live = rejected.live;
            let _ = live.raw.close().await;
        }
    }

    /// Non-async fallback used from `Drop`: pushes the connection back
    /// onto the idle queue synchronously, or spawns a task to close it if
    /// it can't be reused. Never blocks.
    pub(crate) fn release_sync(self: &Arc<Self>, live: Live<C>, force_closed: bool) {
        if !force_closed && !self.is_closed() {
            let idle = Idle {
                live,
                since: Instant::now(),
            };
            if let Err(rejected) = self.idle.put(idle) {
                let pool = self.clone();
                tokio::spawn(async move {
                    pool.size.fetch_sub(1, Ordering::AcqRel);
                    let _ = rejected.live.raw.close().await;
                });
            }
            return;
        }

        let pool = self.clone();
        tokio::spawn(async move {
            pool.size.fetch_sub(1, Ordering::AcqRel);
            let _ = live.raw.close().await;
        });
    }

    /// Drains the idle queue, closing every connection, and marks the pool
    /// closed so future `release`s discard instead of re-enqueue.
    ///
    /// This is the "idle-only, non-blocking" `shutdown_idle` decided in
    /// `DESIGN.md`: checked-out connections are left alone until their
    /// owners release them.
    pub(crate) async fn shutdown_idle(&self) {
        self.closed.store(true, Ordering::Release);
        for idle in self.idle.drain() {
            self.size.fetch_sub(1, Ordering::AcqRel);
            if let Err(e) = idle.live.raw.close().await {
                tracing::debug!(error = %e, "error closing connection during shutdown_idle");
            }
        }
    }
}

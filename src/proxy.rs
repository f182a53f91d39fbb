use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::pool::inner::PoolInner;
use crate::raw::{RawConnection, Statement};

/// A raw connection plus its creation timestamp, used to enforce
/// `max_lifetime`.
pub(crate) struct Live<C> {
    pub(crate) raw: C,
    pub(crate) created: Instant,
}

/// An idle connection plus the time it was released, used to enforce
/// `idle_timeout`.
pub(crate) struct Idle<C> {
    pub(crate) live: Live<C>,
    pub(crate) since: Instant,
}

/// Decrements the pool's total-size counter when dropped, unless
/// [`disarm`](Self::disarm) is called first.
///
/// Grounded on `pool/size.rs`'s `DecreaseOnDrop` guard; owns an `Arc` clone
/// of the pool rather than borrowing it, since connections cross `.await`
/// points and may outlive any single stack frame.
pub(crate) struct SizeGuard<C: RawConnection> {
    pool: Arc<PoolInner<C>>,
    armed: bool,
}

impl<C: RawConnection> SizeGuard<C> {
    pub(crate) fn new(pool: Arc<PoolInner<C>>) -> Self {
        Self { pool, armed: true }
    }

    /// Prevents the decrement: ownership of the size accounting has moved
    /// elsewhere (e.g. into an `Idle<C>` sitting in the queue).
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl<C: RawConnection> Drop for SizeGuard<C> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.size.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// A connection checked out of the pool.
///
/// Grounded on `pool/conn.rs`'s `PoolConnection<C>`. Calling [`close`] is
/// the idiomatic-Rust substitute for the source's runtime `closed` boolean:
/// it consumes `self`, so a closed connection simply can't be used again
/// (the type system enforces what the source checks at runtime). Dropping
/// a `PooledConnection` without calling `close` falls back to releasing it
/// to the pool, matching the source's `Drop` impl.
pub struct PooledConnection<C: RawConnection> {
    live: Option<Live<C>>,
    pool: Arc<PoolInner<C>>,
    open_statements: Vec<C::Statement>,
    force_closed: bool,
}

impl<C: RawConnection> PooledConnection<C> {
    pub(crate) fn new(live: Live<C>, pool: Arc<PoolInner<C>>) -> Self {
        Self {
            live: Some(live),
            pool,
            open_statements: Vec::new(),
            force_closed: false,
        }
    }

    /// When the underlying raw connection was established, used to
    /// enforce `max_lifetime` and observable for diagnostics.
    pub fn created_at(&self) -> Instant {
        self.live.as_ref().expect("live connection present").created
    }

    /// Borrows the raw connection for delegated (non-intercepted) calls.
    pub fn raw(&mut self) -> &mut C {
        &mut self.live.as_mut().expect("live connection present").raw
    }

    /// `true` once the fatal-SQL-state classifier has fired; a
    /// force-closed connection is terminated rather than re-enqueued on
    /// release.
    ///
    /// This is distinct from the source's `isValid(timeout)`, which
    /// delegates to the driver's own liveness probe rather than reporting
    /// the force-closed flag; this crate's liveness probing lives entirely
    /// in `HealthProbe` (run at admission, and optionally at checkout via
    /// `test_before_acquire`), so there is no driver-level `isValid` to
    /// delegate to from here.
    pub fn is_force_closed(&self) -> bool {
        self.force_closed
    }

    /// Prepares a statement and tracks it so `close` can close it in
    /// reverse order. Grounded on the source's `createStatement`/
    /// `prepareStatement` interception.
    pub async fn prepare(&mut self, query: &str) -> Result<()> {
        let live = self.live.as_mut().ok_or(Error::ConnectionClosed)?;
        match live.raw.prepare(query).await {
            Ok(stmt) => {
                self.open_statements.push(stmt);
                Ok(())
            }
            Err(e) => {
                let err = Error::from_sql(e);
                if err.is_fatal() {
                    self.force_closed = true;
                }
                Err(err)
            }
        }
    }

    /// Logically closes the connection: closes every tracked statement in
    /// reverse order (swallowing their errors, matching the source's
    /// "release must not be blocked by statement-close failures" rule),
    /// then releases the connection back to its pool.
    pub async fn close(mut self) {
        for mut stmt in std::mem::take(&mut self.open_statements).into_iter().rev() {
            if let Err(e) = stmt.close().await {
                tracing::debug!(error = %e, "error closing child statement during release");
            }
        }

        if let Some(live) = self.live.take() {
            self.pool.release(live, self.force_closed).await;
        }
    }
}

impl<C: RawConnection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            // Statements left open here are abandoned rather than closed:
            // running async code in `Drop` would require spawning, and an
            // explicit `close()` call is the documented way to flush them.
            self.pool.release_sync(live, self.force_closed);
        }
    }
}

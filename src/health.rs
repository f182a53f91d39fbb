use std::future::Future;

use once_cell::sync::OnceCell;

use crate::raw::RawConnection;

/// Supplies the vendor-specific liveness-probe query, resolved lazily and
/// cached once per pool.
///
/// Grounded on the per-database `test_before_acquire` SQL implied by
/// `sqlx-core`'s `PoolOptions`; `once_cell::sync::OnceCell` is used for the
/// cache because `sqlx-core` already depends on `once_cell`.
pub trait Dialect: Send + Sync + 'static {
    fn test_sql(&self) -> &str;
}

/// A `Dialect` that always answers with a fixed query, for drivers that
/// don't need per-connection negotiation.
pub struct FixedDialect(pub &'static str);

impl Dialect for FixedDialect {
    fn test_sql(&self) -> &str {
        self.0
    }
}

/// Validates a raw connection before it is admitted to the idle queue (and,
/// optionally, before it is handed to a caller — see
/// `PoolOptions::test_before_acquire`).
///
/// Grounded on `sqlx-core`'s `before_acquire`/`test_before_acquire` hook.
/// Implementations must not panic and must not retain the connection
/// reference beyond the call.
pub trait HealthProbe<C: RawConnection>: Send + Sync + 'static {
    fn check<'a>(&'a self, conn: &'a mut C) -> impl Future<Output = bool> + Send + 'a;
}

/// Runs the dialect's test SQL (cached after first resolution) against the
/// connection, with a per-probe timeout. Reports `false` on any error or
/// timeout rather than propagating.
pub struct QueryProbe<D> {
    dialect: D,
    cached_sql: OnceCell<String>,
    timeout: std::time::Duration,
}

impl<D: Dialect> QueryProbe<D> {
    pub fn new(dialect: D, timeout: std::time::Duration) -> Self {
        Self {
            dialect,
            cached_sql: OnceCell::new(),
            timeout,
        }
    }

    fn sql(&self) -> &str {
        self.cached_sql
            .get_or_init(|| self.dialect.test_sql().to_owned())
    }
}

impl<C, D> HealthProbe<C> for QueryProbe<D>
where
    C: RawConnection,
    D: Dialect,
{
    fn check<'a>(&'a self, conn: &'a mut C) -> impl Future<Output = bool> + Send + 'a {
        async move {
            match tokio::time::timeout(self.timeout, conn.execute_probe(self.sql())).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "health probe query failed");
                    false
                }
                Err(_) => {
                    tracing::debug!("health probe timed out");
                    false
                }
            }
        }
    }
}

/// A probe that always reports the connection healthy, used when
/// `test_connection` is disabled.
pub struct NoopProbe;

impl<C: RawConnection> HealthProbe<C> for NoopProbe {
    fn check<'a>(&'a self, _conn: &'a mut C) -> impl Future<Output = bool> + Send + 'a {
        async { true }
    }
}

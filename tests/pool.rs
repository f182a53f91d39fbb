use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use poolboy::error::{Error, SqlError};
use poolboy::{NoopProbe, Pool, PoolOptions, RawConnection, Statement};

struct MockStatement;

impl Statement for MockStatement {
    async fn close(&mut self) -> Result<(), SqlError> {
        Ok(())
    }
}

struct MockConnection {
    #[allow(dead_code)]
    id: u32,
}

impl RawConnection for MockConnection {
    type Statement = MockStatement;

    async fn prepare(&mut self, query: &str) -> Result<Self::Statement, SqlError> {
        if let Some(sqlstate) = query.strip_prefix("FAIL:") {
            return Err(SqlError::new("simulated driver failure", Some(sqlstate.to_string())));
        }
        Ok(MockStatement)
    }

    async fn execute_probe(&mut self, _query: &str) -> Result<(), SqlError> {
        Ok(())
    }

    async fn close(self) -> Result<(), SqlError> {
        Ok(())
    }
}

#[derive(Clone)]
struct MockFactory {
    next_id: Arc<AtomicU32>,
}

impl MockFactory {
    fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl poolboy::ConnectionFactory<MockConnection> for MockFactory {
    async fn connect(&self) -> Result<MockConnection, Error> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection { id })
    }
}

/// Installs a `tracing` subscriber on first call so test output carries the
/// pool's diagnostic logs; safe to call from every test since `try_init`
/// is a no-op once a subscriber is already set.
fn setup_tracing() {
    tracing_subscriber::fmt::try_init().ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_grows_and_releases() {
    setup_tracing();
    let config = PoolOptions::new()
        .init_size(2)
        .min_size(2)
        .max_size(4)
        .increment(1)
        .acquire_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let pool = Pool::connect(config, MockFactory::new(), NoopProbe)
        .await
        .unwrap();

    assert_eq!(pool.total_connections(), 2);
    assert_eq!(pool.idle_connections(), 2);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let c = pool.acquire().await.unwrap();

    assert_eq!(pool.total_connections(), 3);
    assert_eq!(pool.idle_connections(), 0);
    assert_eq!(pool.active_connections(), 3);

    a.close().await;
    b.close().await;
    c.close().await;

    assert_eq!(pool.total_connections(), 3);
    assert_eq!(pool.idle_connections(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn acquire_times_out_when_exhausted() {
    setup_tracing();
    let config = PoolOptions::new()
        .init_size(1)
        .min_size(1)
        .max_size(1)
        .acquire_timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let pool = Pool::connect(config, MockFactory::new(), NoopProbe)
        .await
        .unwrap();

    let _held = pool.acquire().await.unwrap();

    let start = std::time::Instant::now();
    let result = pool.acquire().await;
    let elapsed = start.elapsed();

    let err = result.unwrap_err();
    assert!(matches!(err, Error::PoolExhausted { idle: 0, total: 1, max: 1, .. }));
    assert!(err.to_string().contains("idle=0/1"));
    assert!(elapsed >= Duration::from_millis(90) && elapsed <= Duration::from_millis(250));
}

#[tokio::test(flavor = "multi_thread")]
async fn max_lifetime_is_enforced_on_checkout() {
    setup_tracing();
    let config = PoolOptions::new()
        .init_size(1)
        .min_size(1)
        .max_size(2)
        .max_lifetime(Some(Duration::from_millis(50)))
        .acquire_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let pool = Pool::connect(config, MockFactory::new(), NoopProbe)
        .await
        .unwrap();

    let first = pool.acquire().await.unwrap();
    let first_created = first.created_at();
    first.close().await;

    tokio::time::sleep(Duration::from_millis(60)).await;

    let second = pool.acquire().await.unwrap();
    assert!(second.created_at() > first_created);
    second.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_sqlstate_forces_connection_closed() {
    setup_tracing();
    let config = PoolOptions::new()
        .init_size(1)
        .min_size(1)
        .max_size(2)
        .acquire_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let pool = Pool::connect(config, MockFactory::new(), NoopProbe)
        .await
        .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let err = conn.prepare("FAIL:08003").await.unwrap_err();
    assert!(matches!(err, Error::TransportFatal(_)));
    assert!(conn.is_force_closed());

    conn.close().await;

    assert_eq!(pool.total_connections(), 0);
    assert_eq!(pool.idle_connections(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn janitor_evicts_idle_connections_past_idle_timeout() {
    setup_tracing();
    let config = PoolOptions::new()
        .init_size(2)
        .min_size(0)
        .max_size(2)
        .idle_timeout(Some(Duration::from_millis(100)))
        .janitor_period(Duration::from_millis(50))
        .build()
        .unwrap();

    let pool = Pool::connect(config, MockFactory::new(), NoopProbe)
        .await
        .unwrap();

    assert_eq!(pool.idle_connections(), 2);

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(pool.idle_connections(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn janitor_refills_to_min_size() {
    setup_tracing();
    let config = PoolOptions::new()
        .init_size(0)
        .min_size(2)
        .max_size(4)
        .janitor_period(Duration::from_millis(50))
        .build()
        .unwrap();

    let pool = Pool::connect(config, MockFactory::new(), NoopProbe)
        .await
        .unwrap();

    assert_eq!(pool.total_connections(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(pool.total_connections() >= 2);
}

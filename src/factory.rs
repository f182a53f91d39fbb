use std::future::Future;

use crate::error::Error;
use crate::raw::RawConnection;

/// Opens new raw connections on behalf of the pool.
///
/// Grounded on `sqlx-core`'s `PoolConnector` trait: a return-position `impl
/// Future` method instead of `#[async_trait]`, with a blanket impl below so
/// any `Fn() -> impl Future<Output = Result<C, Error>>` closure satisfies
/// the trait without a wrapper type.
pub trait ConnectionFactory<C: RawConnection>: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<C, Error>> + Send + '_;
}

impl<C, F, Fut> ConnectionFactory<C> for F
where
    C: RawConnection,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, Error>> + Send,
{
    fn connect(&self) -> impl Future<Output = Result<C, Error>> + Send + '_ {
        (self)()
    }
}

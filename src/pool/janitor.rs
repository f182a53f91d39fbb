use std::sync::Arc;

use crate::pool::inner::PoolInner;
use crate::raw::RawConnection;

/// Periodically evicts idle/aged connections and refills to `min_size`.
///
/// Grounded on `pool/inner.rs`'s `conn_reaper()` background task, adapted
/// from its channel-based idle store to the `IdleQueue`/`PoolInner`
/// design used here. Per `DESIGN.md`'s Open Question 3, this does not
/// reproduce any "purge the scheduler" step at the top of a tick — the
/// source's equivalent step was judged vestigial.
pub(crate) fn spawn<C: RawConnection>(pool: Arc<PoolInner<C>>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(pool.config.janitor_period).await;

            if pool.is_closed() {
                return;
            }

            tick(&pool).await;
        }
    })
}

async fn tick<C: RawConnection>(pool: &Arc<PoolInner<C>>) {
    let snapshot = pool.idle_count();

    for _ in 0..snapshot {
        let Some(idle) = pool.idle.try_get() else {
            break;
        };

        let idle_expired = pool
            .config
            .idle_timeout
            .is_some_and(|timeout| idle.since.elapsed() > timeout);
        let aged_out = pool
            .config
            .max_lifetime
            .is_some_and(|lifetime| idle.live.created.elapsed() > lifetime);

        if idle_expired || aged_out {
            tracing::trace!(
                idle_expired,
                aged_out,
                "janitor evicting connection"
            );
            pool.terminate(idle.live).await;
        } else if pool.idle.put(idle).is_err() {
            tracing::warn!("janitor could not re-enqueue a surviving idle connection");
        }
    }

    if pool.total() < pool.config.min_size {
        tracing::trace!(
            total = pool.total(),
            min_size = pool.config.min_size,
            "janitor refilling pool to min_size"
        );
        pool.try_grow().await;
    }
}

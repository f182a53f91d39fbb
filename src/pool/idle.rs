use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use event_listener::Event;

use crate::proxy::Idle;
use crate::raw::RawConnection;

/// Bounded, lock-free FIFO of idle connections with an async, deadline-
/// bounded `get`.
///
/// Grounded on `pool/idle.rs`'s `IdleQueue<DB>`: an `ArrayQueue` paired
/// with an `event_listener::Event` so waiters can be woken without polling.
pub(crate) struct IdleQueue<C: RawConnection> {
    queue: ArrayQueue<Idle<C>>,
    len: AtomicUsize,
    release_event: Event,
}

impl<C: RawConnection> IdleQueue<C> {
    pub(crate) fn new(capacity: u32) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1) as usize),
            len: AtomicUsize::new(0),
            release_event: Event::new(),
        }
    }

    pub(crate) fn len(&self) -> u32 {
        self.len.load(Ordering::Acquire) as u32
    }

    /// Pushes a connection onto the idle queue and wakes one waiter.
    ///
    /// Returns the connection back if the queue was at capacity (it should
    /// never be, since size accounting keeps `total <= max_size`, but the
    /// caller must still handle it rather than panic).
    pub(crate) fn put(&self, idle: Idle<C>) -> Result<(), Idle<C>> {
        match self.queue.push(idle) {
            Ok(()) => {
                self.len.fetch_add(1, Ordering::AcqRel);
                self.release_event.notify(1);
                Ok(())
            }
            Err(idle) => Err(idle),
        }
    }

    pub(crate) fn try_get(&self) -> Option<Idle<C>> {
        let popped = self.queue.pop();
        if popped.is_some() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        popped
    }

    /// Waits up to `deadline_remaining` for a connection to become
    /// available.
    pub(crate) async fn get(&self, deadline_remaining: Duration) -> Option<Idle<C>> {
        loop {
            if let Some(idle) = self.try_get() {
                return Some(idle);
            }

            let listener = self.release_event.listen();

            // Re-check after registering the listener to avoid the
            // classic missed-wakeup race between the first `try_get` and
            // `listen()`.
            if let Some(idle) = self.try_get() {
                return Some(idle);
            }

            if tokio::time::timeout(deadline_remaining, listener)
                .await
                .is_err()
            {
                return None;
            }
        }
    }

    /// Drains every idle connection, for `shutdown_idle`/`close`.
    pub(crate) fn drain(&self) -> Vec<Idle<C>> {
        let mut drained = Vec::new();
        while let Some(idle) = self.try_get() {
            drained.push(idle);
        }
        drained
    }
}

//! Pool entries and the slot reservation guard

use std::sync::Arc;

use quarry_core::Connection;
use tokio::time::Instant;

use super::config::PoolConfig;
use super::pool::{PoolInner, PoolState};

/// Pool-assigned identity of a live connection
pub type ConnectionId = u64;

/// One live connection plus its bookkeeping timestamps
pub(crate) struct PoolEntry {
    pub(crate) id: ConnectionId,
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
}

impl PoolEntry {
    pub(crate) fn new(id: ConnectionId, connection: Arc<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            connection,
            created_at: now,
            last_used_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    /// Why this entry should be reaped at `now`, if it should
    pub(crate) fn expiry(&self, config: &PoolConfig, now: Instant) -> Option<&'static str> {
        if now.saturating_duration_since(self.last_used_at) > config.idle_timeout() {
            return Some("idle timeout");
        }
        match config.max_lifetime() {
            Some(max) if now.saturating_duration_since(self.created_at) > max => {
                Some("max lifetime")
            }
            _ => None,
        }
    }
}

/// Capacity held for work happening outside the lock.
///
/// Slots are counted in `PoolState::pending` so concurrent creators can never
/// overshoot `max_size`. Dropping the guard (an error, a panic, or a
/// cancelled future) gives the slots back and wakes waiting acquirers.
pub(crate) struct Reservation<'a> {
    inner: &'a PoolInner,
    slots: usize,
    probing: bool,
}

impl<'a> Reservation<'a> {
    /// Wrap slots that were already added to `state.pending` under the lock
    pub(crate) fn holding(inner: &'a PoolInner, slots: usize) -> Self {
        Self {
            inner,
            slots,
            probing: false,
        }
    }

    /// Like [`holding`](Self::holding), for idle entries taken out to be
    /// probed; the slots were also added to `state.probing`
    pub(crate) fn probing(inner: &'a PoolInner, slots: usize) -> Self {
        Self {
            inner,
            slots,
            probing: true,
        }
    }

    fn give_back(&self, state: &mut PoolState) {
        state.pending -= self.slots;
        if self.probing {
            state.probing -= self.slots;
        }
    }

    /// Release the slots and apply `apply` in the same critical section
    pub(crate) fn settle<R>(mut self, apply: impl FnOnce(&mut PoolState) -> R) -> R {
        let result = {
            let mut state = self.inner.state.lock();
            self.give_back(&mut state);
            apply(&mut state)
        };
        self.slots = 0;
        self.inner.released.notify_waiters();
        result
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.slots == 0 {
            return;
        }
        self.give_back(&mut self.inner.state.lock());
        self.inner.released.notify_waiters();
    }
}

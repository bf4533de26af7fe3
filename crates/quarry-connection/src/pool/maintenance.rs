//! Background maintenance: reaping, probing and replenishment

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::config::ProbePolicy;
use super::entry::{PoolEntry, Reservation};
use super::pool::PoolInner;

/// What a single sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Idle entries closed for exceeding the idle timeout or max lifetime
    pub reaped: usize,
    /// Idle entries that were probed
    pub probed: usize,
    /// Probed entries that failed and were closed
    pub evicted: usize,
    /// New connections opened to restore `min_size`
    pub created: usize,
}

impl SweepReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Start the maintenance task.
///
/// The task holds only a weak reference, so dropping every pool handle
/// stops it as well as cancelling the pool's token.
pub(crate) fn spawn(inner: &Arc<PoolInner>) -> JoinHandle<()> {
    let pool = Arc::downgrade(inner);
    let cancel = inner.cancel.clone();
    let interval = inner.config.validate_interval();

    tokio::spawn(async move {
        tracing::debug!(?interval, "pool maintenance started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let Some(inner) = pool.upgrade() else {
                break;
            };
            match AssertUnwindSafe(inner.sweep()).catch_unwind().await {
                Ok(report) if !report.is_noop() => {
                    tracing::debug!(
                        reaped = report.reaped,
                        probed = report.probed,
                        evicted = report.evicted,
                        created = report.created,
                        "pool sweep finished"
                    );
                }
                Ok(_) => {}
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(panic = %message, "pool sweep panicked; retrying next period");
                }
            }
        }
        tracing::debug!("pool maintenance stopped");
    })
}

impl PoolInner {
    /// One maintenance pass: reap, probe, replenish
    pub(crate) async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = Instant::now();
        let probe = match self.config.probe_policy() {
            ProbePolicy::Always => true,
            ProbePolicy::UntilHealthy => !self.healthy.load(Ordering::SeqCst),
        };

        let (expired, candidates, reservation) = {
            let mut state = self.state.lock();
            if state.closed {
                return report;
            }

            let (expired, keep): (Vec<PoolEntry>, Vec<PoolEntry>) = state
                .idle
                .drain(..)
                .partition(|entry| entry.expiry(&self.config, now).is_some());

            // Acquirers that find nothing else free wait for these to come
            // back instead of failing with `PoolExhausted`.
            if probe {
                state.pending += keep.len();
                state.probing += keep.len();
                let reservation = Reservation::probing(self, keep.len());
                (expired, keep, Some(reservation))
            } else {
                state.idle.extend(keep);
                (expired, Vec::new(), None)
            }
        };

        report.reaped = expired.len();
        for entry in expired {
            tracing::debug!(
                connection_id = entry.id,
                reason = entry.expiry(&self.config, now).unwrap_or("expired"),
                "reaping idle connection"
            );
            let _ = entry.connection.close().await;
        }

        if let Some(reservation) = reservation {
            report.probed = candidates.len();
            let verdicts = join_all(
                candidates
                    .iter()
                    .map(|entry| self.factory.validate(&*entry.connection)),
            )
            .await;

            let (alive, dead): (Vec<_>, Vec<_>) = candidates
                .into_iter()
                .zip(verdicts)
                .partition(|(_, ok)| *ok);
            report.evicted = dead.len();
            if report.probed > 0 {
                self.healthy.store(dead.is_empty(), Ordering::SeqCst);
            }

            // Survivors are older than anything released during the probe,
            // so they go back in front to keep LIFO order.
            let orphaned = reservation.settle(|state| {
                if state.closed {
                    return alive.into_iter().map(|(entry, _)| entry).collect::<Vec<PoolEntry>>();
                }
                for (entry, _) in alive.into_iter().rev() {
                    state.idle.push_front(entry);
                }
                Vec::new()
            });

            for (entry, _) in dead {
                tracing::warn!(connection_id = entry.id, "evicting connection that failed its liveness probe");
                let _ = entry.connection.close().await;
            }
            for entry in orphaned {
                let _ = entry.connection.close().await;
            }
        }

        let min_size = self.config.min_size();
        loop {
            match self.open_idle(min_size).await {
                Ok(Some(id)) => {
                    tracing::debug!(connection_id = id, "replenished pool");
                    report.created += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to replenish pool; retrying next sweep");
                    break;
                }
            }
        }

        report
    }
}

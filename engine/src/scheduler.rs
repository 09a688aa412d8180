//! Lease scheduler: periodic reclamation of overdue holds.
//!
//! One sweep task per engine. Each cycle lists overdue active
//! reservations oldest-first, expires each (reservation, seat) pair
//! through the ledger, warns holders whose leases are about to lapse,
//! and closes lapsed group requests. Per-record failures are logged and
//! left for the next cycle; the sweep never aborts mid-batch.
//!
//! Batch releases ("drop everything this session holds") go through a
//! bounded queue drained by a worker task, keeping the caller's path
//! fire-and-forget.

use crate::config::EngineConfig;
use crate::group::GroupBookingCoordinator;
use crate::ledger::ReservationLedger;
use crate::retry::{retry_transient, RetryPolicy};
use seathold_core::environment::Clock;
use seathold_core::error::HoldError;
use seathold_core::notify::{NotificationChannel, SeatEvent};
use seathold_core::store::ReservationStore;
use seathold_core::types::{ClaimantId, ReservationId, SeatId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What one sweep cycle did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Overdue reservations the cycle looked at
    pub scanned: usize,
    /// Pairs actually expired
    pub expired: usize,
    /// Records skipped (raced transitions)
    pub skipped: usize,
    /// Records that errored and were left for the next cycle
    pub failed: usize,
    /// Expiry warnings published this cycle
    pub warned: usize,
    /// Group requests closed this cycle
    pub groups_closed: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Periodic sweep over overdue and soon-to-expire reservations.
pub struct LeaseScheduler {
    ledger: Arc<ReservationLedger>,
    reservations: Arc<dyn ReservationStore>,
    notifier: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    groups: Option<Arc<GroupBookingCoordinator>>,
    retry: RetryPolicy,
    // Holds already warned this window; pruned as records leave it.
    warned: Mutex<HashSet<ReservationId>>,
}

impl LeaseScheduler {
    /// Creates a scheduler; group-request expiry is off until
    /// [`Self::with_groups`] attaches a coordinator.
    #[must_use]
    pub fn new(
        ledger: Arc<ReservationLedger>,
        reservations: Arc<dyn ReservationStore>,
        notifier: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            ledger,
            reservations,
            notifier,
            clock,
            config,
            groups: None,
            retry,
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Attach a group coordinator so the sweep also closes lapsed
    /// group requests.
    #[must_use]
    pub fn with_groups(mut self, groups: Arc<GroupBookingCoordinator>) -> Self {
        self.groups = Some(groups);
        self
    }

    /// Run one sweep cycle.
    ///
    /// Idempotent: a second cycle over the same state finds nothing
    /// overdue and reports zero work.
    ///
    /// # Errors
    ///
    /// Returns a store failure from *listing* the batch; per-record
    /// failures are counted in the report instead.
    pub async fn sweep_once(&self) -> Result<SweepReport, HoldError> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let overdue = retry_transient(&self.retry, || {
            self.reservations
                .expired_active(now, self.config.sweep_batch_size)
        })
        .await?;
        report.scanned = overdue.len();

        for reservation in overdue {
            match self.ledger.expire(reservation.id).await {
                Ok(Some(_)) => report.expired += 1,
                Ok(None) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        reservation_id = %reservation.id,
                        error = %err,
                        "sweep could not expire reservation, retrying next cycle"
                    );
                }
            }
        }

        report.warned = self.warn_expiring(now).await;

        if let Some(groups) = &self.groups {
            report.groups_closed = groups.expire_requests(now).await;
        }

        if report.expired > 0 || report.failed > 0 || report.groups_closed > 0 {
            tracing::info!(
                scanned = report.scanned,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                warned = report.warned,
                groups_closed = report.groups_closed,
                "sweep cycle complete"
            );
        }
        Ok(report)
    }

    /// Publish a once-only warning for each hold entering the warn
    /// window. Returns how many warnings went out.
    async fn warn_expiring(&self, now: chrono::DateTime<chrono::Utc>) -> usize {
        let window_end = now + self.config.expiry_warn();
        let expiring = match retry_transient(&self.retry, || {
            self.reservations.expiring_between(now, window_end)
        })
        .await
        {
            Ok(expiring) => expiring,
            Err(err) => {
                tracing::warn!(error = %err, "could not list expiring reservations");
                return 0;
            }
        };

        let fresh: Vec<_> = {
            let mut warned = lock(&self.warned);
            let in_window: HashSet<ReservationId> =
                expiring.iter().map(|r| r.id).collect();
            warned.retain(|id| in_window.contains(id));
            expiring
                .into_iter()
                .filter(|r| warned.insert(r.id))
                .collect()
        };

        let mut sent = 0;
        for reservation in fresh {
            let event = SeatEvent::ReservationExpiring {
                reservation_id: reservation.id,
                seat_id: reservation.seat_id,
                expires_at: reservation.expires_at,
            };
            match self.notifier.publish(reservation.venue_id, event).await {
                Ok(()) => sent += 1,
                Err(err) => {
                    tracing::warn!(
                        reservation_id = %reservation.id,
                        error = %err,
                        "expiry warning publish failed"
                    );
                    // Allow a retry next cycle.
                    lock(&self.warned).remove(&reservation.id);
                }
            }
        }
        sent
    }

    /// Sweep on an interval until `shutdown` flips to `true` or its
    /// sender drops.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
            self.config.sweep_interval_secs,
        ));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            interval_secs = self.config.sweep_interval_secs,
            "lease scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        tracing::error!(error = %err, "sweep cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("lease scheduler stopped");
    }
}

struct ReleaseJob {
    claimant: ClaimantId,
    seats: Option<Vec<SeatId>>,
}

/// Fire-and-forget batch release of a claimant's holds.
///
/// Jobs are queued and drained by a worker task; each of the claimant's
/// active reservations is cancelled independently, with failures logged
/// rather than failing the batch.
pub struct ReleaseQueue {
    tx: mpsc::Sender<ReleaseJob>,
}

impl ReleaseQueue {
    /// Spawn the worker and return the queue handle plus the worker's
    /// join handle (awaited at shutdown).
    #[must_use]
    pub fn spawn(ledger: Arc<ReservationLedger>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ReleaseJob>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                drain_job(&ledger, job).await;
            }
            tracing::debug!("release queue worker stopped");
        });
        (Self { tx }, worker)
    }

    /// Queue a release of every hold `claimant` owns, optionally
    /// restricted to `seats`.
    ///
    /// # Errors
    ///
    /// Returns [`HoldError::ReleaseQueueClosed`] once the worker has
    /// shut down.
    pub async fn enqueue_release(
        &self,
        claimant: ClaimantId,
        seats: Option<Vec<SeatId>>,
    ) -> Result<(), HoldError> {
        self.tx
            .send(ReleaseJob { claimant, seats })
            .await
            .map_err(|_| HoldError::ReleaseQueueClosed)
    }
}

async fn drain_job(ledger: &ReservationLedger, job: ReleaseJob) {
    let active = match ledger.active_for_claimant(&job.claimant).await {
        Ok(active) => active,
        Err(err) => {
            tracing::warn!(claimant = %job.claimant, error = %err, "batch release listing failed");
            return;
        }
    };

    let mut released = 0;
    for reservation in active {
        if let Some(subset) = &job.seats {
            if !subset.contains(&reservation.seat_id) {
                continue;
            }
        }
        match ledger.cancel(reservation.id, "batch release").await {
            Ok(_) => released += 1,
            Err(err) => {
                tracing::warn!(
                    claimant = %job.claimant,
                    reservation_id = %reservation.id,
                    error = %err,
                    "batch release could not cancel reservation"
                );
            }
        }
    }
    tracing::info!(claimant = %job.claimant, released, "batch release drained");
}

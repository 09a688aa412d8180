//! Engine wiring and graceful shutdown.
//!
//! [`Engine::start`] builds every component over the supplied stores,
//! spawns the background tasks (lease sweep, release queue worker), and
//! hands back a facade the embedding service calls into. Shutdown is
//! coordinated with a `tokio::sync::watch` flag: flip it, then wait a
//! bounded time for each task to finish its current work.

use crate::config::EngineConfig;
use crate::finder::SeatFinder;
use crate::group::GroupBookingCoordinator;
use crate::ledger::ReservationLedger;
use crate::registry::SeatRegistry;
use crate::scheduler::{LeaseScheduler, ReleaseQueue};
use seathold_core::environment::Clock;
use seathold_core::notify::NotificationChannel;
use seathold_core::store::{ReservationStore, SeatStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Running engine with its background tasks.
///
/// Owns the component graph and the shutdown signal. Dropping the
/// engine without calling [`Engine::shutdown`] aborts nothing; the
/// embedding service is expected to shut down explicitly.
pub struct Engine {
    registry: Arc<SeatRegistry>,
    ledger: Arc<ReservationLedger>,
    finder: Arc<SeatFinder>,
    groups: Arc<GroupBookingCoordinator>,
    releases: ReleaseQueue,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Build the component graph and spawn the background tasks.
    #[must_use]
    pub fn start(
        seats: Arc<dyn SeatStore>,
        reservations: Arc<dyn ReservationStore>,
        notifier: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let config = Arc::new(config);
        let retry = config.retry_policy();

        let registry = Arc::new(SeatRegistry::new(
            Arc::clone(&seats),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            retry.clone(),
        ));
        let ledger = Arc::new(ReservationLedger::new(
            Arc::clone(&registry),
            Arc::clone(&reservations),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            Arc::clone(&config),
        ));
        let finder = Arc::new(SeatFinder::new(Arc::clone(&seats), retry));
        let groups = Arc::new(GroupBookingCoordinator::new(
            Arc::clone(&finder),
            Arc::clone(&ledger),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            Arc::clone(&config),
        ));
        let scheduler = Arc::new(
            LeaseScheduler::new(
                Arc::clone(&ledger),
                reservations,
                notifier,
                clock,
                Arc::clone(&config),
            )
            .with_groups(Arc::clone(&groups)),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweep_task = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(shutdown_rx).await })
        };
        let (releases, release_task) =
            ReleaseQueue::spawn(Arc::clone(&ledger), config.release_queue_capacity);

        info!("seat hold engine started");
        Self {
            registry,
            ledger,
            finder,
            groups,
            releases,
            shutdown_tx,
            tasks: vec![sweep_task, release_task],
        }
    }

    /// Seat-level claim / release / status operations.
    #[must_use]
    pub fn registry(&self) -> &Arc<SeatRegistry> {
        &self.registry
    }

    /// Reservation create / extend / cancel / complete operations.
    #[must_use]
    pub fn ledger(&self) -> &Arc<ReservationLedger> {
        &self.ledger
    }

    /// Read-only seat search.
    #[must_use]
    pub fn finder(&self) -> &Arc<SeatFinder> {
        &self.finder
    }

    /// Group booking requests.
    #[must_use]
    pub fn groups(&self) -> &Arc<GroupBookingCoordinator> {
        &self.groups
    }

    /// Fire-and-forget batch releases.
    #[must_use]
    pub fn releases(&self) -> &ReleaseQueue {
        &self.releases
    }

    /// Stop the background tasks, waiting a bounded time for each.
    pub async fn shutdown(self) {
        info!("seat hold engine shutting down");
        let _ = self.shutdown_tx.send(true);
        drop(self.releases); // closes the queue so its worker drains out

        for (idx, handle) in self.tasks.into_iter().enumerate() {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => info!(task = idx, "background task stopped"),
                Ok(Err(err)) => warn!(task = idx, error = %err, "background task failed"),
                Err(_) => warn!(task = idx, "background task shutdown timed out"),
            }
        }
        info!("seat hold engine stopped");
    }
}

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::{error, info};

use crate::database::DatabaseService;
use crate::dispatcher::{AlertDispatcher, DispatchRequest};
use crate::error::Result;
use crate::registry::LivenessRegistry;

/// Periodic scan that marks stale stores offline and re-fires
/// cooldown-governed repeat alerts. Grounded on the same own-task,
/// own-interval shape as a periodic heartbeat monitor, widened with an
/// explicit shutdown signal.
pub struct HealthSweeper {
    registry: Arc<LivenessRegistry>,
    db: Arc<DatabaseService>,
    dispatcher: Arc<AlertDispatcher>,
    threshold: Duration,
    epsilon: Duration,
    interval: StdDuration,
}

impl HealthSweeper {
    pub fn new(
        registry: Arc<LivenessRegistry>,
        db: Arc<DatabaseService>,
        dispatcher: Arc<AlertDispatcher>,
        threshold_minutes: i64,
        epsilon_seconds: i64,
        interval_minutes: u64,
    ) -> Self {
        Self {
            registry,
            db,
            dispatcher,
            threshold: Duration::minutes(threshold_minutes),
            epsilon: Duration::seconds(epsilon_seconds),
            interval: StdDuration::from_secs(interval_minutes.max(1) * 60),
        }
    }

    /// Hydrates every store known to persistence but not yet observed
    /// this process lifetime. Called at startup and from the admin
    /// trigger endpoint only — not on every timer tick, to bound DB load.
    pub async fn hydrate_from_db(&self) -> Result<()> {
        let rows = self.db.list_store_ids().await?;
        for (store_id, store_name, created_at) in rows {
            self.registry.hydrate(store_id, store_name, created_at);
        }
        Ok(())
    }

    /// Runs one sweep pass over the in-memory registry (no DB hydration).
    pub async fn run_once(&self) {
        let store_ids = self.registry.known_store_ids();
        let now = Utc::now();
        let transitions = self
            .registry
            .sweep(&store_ids, now, self.threshold, self.epsilon)
            .await;

        for transition in transitions {
            let Some(candidate) = transition.candidate_alert else {
                continue;
            };

            let result = self
                .dispatcher
                .dispatch(DispatchRequest {
                    store_id: transition.store_id.clone(),
                    store_name: transition.store_name.clone(),
                    kind: candidate.kind,
                    force: candidate.force,
                    telemetry: transition.telemetry,
                })
                .await;

            if let Err(err) = result {
                error!(store_id = %transition.store_id, error = %err, "failed to dispatch offline alert");
            }

            if let Err(err) = self
                .db
                .update_store_status(&transition.store_id, transition.to)
                .await
            {
                error!(store_id = %transition.store_id, error = %err, "failed to persist offline status");
            }
        }
    }

    /// Spawns the periodic timer loop, observing `shutdown` for graceful
    /// exit. Every tick is idempotent, so a missed tick under load is
    /// not catastrophic.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        if let Err(err) = self.hydrate_from_db().await {
            error!(error = %err, "startup hydration failed");
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // first tick fires immediately; skip it, startup already hydrated

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    info!("health sweeper shutting down");
                    break;
                }
            }
        }
    }
}

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use storewatch_common::{AlertKind, Heartbeat, StoreId, StoreStatus};
use tokio::sync::Mutex;

/// A candidate alert produced by a state transition. The registry never
/// decides whether to actually send it — that is cooldown policy, owned
/// by the dispatcher (see `dispatcher.rs`). `force = true` means the
/// cooldown check must be bypassed (the first `Online -> Offline`
/// transition always fires).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCandidate {
    pub kind: AlertKind,
    pub force: bool,
}

/// The outcome of a single state-transition event, independent of any
/// I/O. `AlertDispatcher` turns this into zero or one persisted alerts.
#[derive(Debug, Clone)]
pub struct Transition {
    pub store_id: StoreId,
    pub store_name: String,
    pub from: StoreStatus,
    pub to: StoreStatus,
    pub candidate_alert: Option<AlertCandidate>,
    pub telemetry: Option<Heartbeat>,
}

/// In-memory snapshot of a store's liveness, mirrored to the persistent
/// `stores` row.
#[derive(Debug, Clone)]
pub struct StoreLivenessRecord {
    pub store_id: StoreId,
    pub store_name: String,
    pub location: Option<String>,
    pub status: StoreStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub first_seen: DateTime<Utc>,
    pub latest_metrics: Option<Heartbeat>,
}

impl StoreLivenessRecord {
    fn hydrated(store_id: StoreId, store_name: String, status: StoreStatus, first_seen: DateTime<Utc>) -> Self {
        Self {
            store_id,
            store_name,
            location: None,
            status,
            last_heartbeat: None,
            first_seen,
            latest_metrics: None,
        }
    }
}

/// Per-store in-memory liveness state. Concurrent updates to distinct
/// stores proceed independently; updates to the same store serialize
/// through that store's `Mutex`.
pub struct LivenessRegistry {
    stores: DashMap<StoreId, Mutex<StoreLivenessRecord>>,
}

impl Default for LivenessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessRegistry {
    pub fn new() -> Self {
        Self {
            stores: DashMap::new(),
        }
    }

    /// Hydrates a store known to persistence but not yet observed this
    /// process lifetime. Never overwrites an existing in-memory record.
    pub fn hydrate(&self, store_id: StoreId, store_name: String, first_seen: DateTime<Utc>) {
        self.stores.entry(store_id.clone()).or_insert_with(|| {
            Mutex::new(StoreLivenessRecord::hydrated(
                store_id,
                store_name,
                StoreStatus::Unknown,
                first_seen,
            ))
        });
    }

    /// Returns the set of store ids currently known in memory, taken as
    /// a point-in-time snapshot (concurrent inserts land on the next
    /// sweep rather than this one).
    pub fn known_store_ids(&self) -> Vec<StoreId> {
        self.stores.iter().map(|e| e.key().clone()).collect()
    }

    pub async fn snapshot(&self, store_id: &StoreId) -> Option<StoreLivenessRecord> {
        if let Some(entry) = self.stores.get(store_id) {
            Some(entry.lock().await.clone())
        } else {
            None
        }
    }

    pub async fn all_snapshots(&self) -> Vec<StoreLivenessRecord> {
        let mut out = Vec::with_capacity(self.stores.len());
        for entry in self.stores.iter() {
            out.push(entry.value().lock().await.clone());
        }
        out
    }

    /// Applies an incoming heartbeat to the registry and returns the
    /// resulting transition. This is the only place `Online`/`Recovery`
    /// transitions are produced — the sweeper never does.
    pub async fn observe(&self, heartbeat: &Heartbeat, now: DateTime<Utc>) -> Transition {
        let store_id = heartbeat.store_id.clone();
        let entry = self.stores.entry(store_id.clone()).or_insert_with(|| {
            Mutex::new(StoreLivenessRecord::hydrated(
                store_id.clone(),
                heartbeat.store_name.clone(),
                StoreStatus::Unknown,
                now,
            ))
        });
        let mut record = entry.lock().await;

        let from = record.status;

        record.store_name = heartbeat.store_name.clone();
        let is_newer = record
            .last_heartbeat
            .map(|last| heartbeat.timestamp >= last)
            .unwrap_or(true);
        if is_newer {
            record.last_heartbeat = Some(match record.last_heartbeat {
                Some(last) => last.max(heartbeat.timestamp),
                None => heartbeat.timestamp,
            });
            record.latest_metrics = Some(heartbeat.clone());
        }
        record.status = StoreStatus::Online;

        let candidate_alert = if heartbeat.is_startup {
            // A startup flag always means "startup", even on a store that
            // was already online (client-side process restart), never a
            // recovery.
            Some(AlertCandidate {
                kind: AlertKind::Startup,
                force: false,
            })
        } else {
            match from {
                StoreStatus::Offline => Some(AlertCandidate {
                    kind: AlertKind::Recovery,
                    force: false,
                }),
                // Covers both a brand-new store and one hydrated from
                // persistence with no heartbeat yet seen this process
                // lifetime; cooldown naturally allows the former since no
                // prior startup alert for the store exists.
                StoreStatus::Unknown => Some(AlertCandidate {
                    kind: AlertKind::Startup,
                    force: false,
                }),
                StoreStatus::Online => None,
            }
        };

        Transition {
            store_id: record.store_id.clone(),
            store_name: record.store_name.clone(),
            from,
            to: StoreStatus::Online,
            candidate_alert,
            telemetry: Some(heartbeat.clone()),
        }
    }

    /// Runs one sweeper pass over the given store ids, transitioning
    /// stale stores to `Offline`. `threshold + epsilon` is the staleness
    /// cutoff. Never produces an `Offline -> Online` or `Unknown ->
    /// Online` transition.
    pub async fn sweep(
        &self,
        store_ids: &[StoreId],
        now: DateTime<Utc>,
        threshold: Duration,
        epsilon: Duration,
    ) -> Vec<Transition> {
        let cutoff = threshold + epsilon;
        let mut transitions = Vec::new();

        for store_id in store_ids {
            let Some(entry) = self.stores.get(store_id) else {
                continue;
            };
            let mut record = entry.lock().await;

            let Some(last_heartbeat) = record.last_heartbeat else {
                continue;
            };
            let delta = now - last_heartbeat;
            if delta <= cutoff {
                continue;
            }

            let from = record.status;
            if from != StoreStatus::Offline {
                record.status = StoreStatus::Offline;
                transitions.push(Transition {
                    store_id: record.store_id.clone(),
                    store_name: record.store_name.clone(),
                    from,
                    to: StoreStatus::Offline,
                    candidate_alert: Some(AlertCandidate {
                        kind: AlertKind::Offline,
                        force: true,
                    }),
                    telemetry: None,
                });
            } else {
                transitions.push(Transition {
                    store_id: record.store_id.clone(),
                    store_name: record.store_name.clone(),
                    from,
                    to: StoreStatus::Offline,
                    candidate_alert: Some(AlertCandidate {
                        kind: AlertKind::Offline,
                        force: false,
                    }),
                    telemetry: None,
                });
            }
        }

        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storewatch_common::{
        ApplicationStats, CameraStatus, LocationInfo, NetworkInfo, SystemStats,
    };

    fn heartbeat(store_id: &str, is_startup: bool, timestamp: DateTime<Utc>) -> Heartbeat {
        Heartbeat {
            store_id: StoreId::new(store_id),
            store_name: "Test Store".to_string(),
            timestamp,
            is_startup,
            system_stats: SystemStats {
                cpu_percent: 10.0,
                memory_percent: 20.0,
                memory_available_gb: 4.0,
                disk_free_gb: 50.0,
                disk_use_percent: 30.0,
                process_memory_mb: 128.0,
                uptime_hours: 1.0,
                network_connected: true,
                network_speed_mbps: Some(50.0),
            },
            camera_status: CameraStatus {
                total_cameras: 2,
                active_cameras: 2,
                cameras: vec![],
            },
            application_stats: ApplicationStats {
                last_detection_time: None,
                total_detections_today: 0,
                app_version: "1.0".to_string(),
                runtime_version: "1.0".to_string(),
                consecutive_failures: 0,
                last_successful_connection: None,
            },
            location_info: LocationInfo {
                timezone: "UTC".to_string(),
                local_time: timestamp.into(),
            },
            network_info: NetworkInfo {
                current_speed_mbps: Some(50.0),
                recent_speed_samples: vec![50.0],
            },
        }
    }

    #[tokio::test]
    async fn first_heartbeat_creates_online_record_with_startup_candidate() {
        let registry = LivenessRegistry::new();
        let now = Utc::now();
        let transition = registry.observe(&heartbeat("A", true, now), now).await;

        assert_eq!(transition.from, StoreStatus::Unknown);
        assert_eq!(transition.to, StoreStatus::Online);
        assert_eq!(
            transition.candidate_alert.unwrap().kind,
            AlertKind::Startup
        );
    }

    #[tokio::test]
    async fn steady_state_heartbeat_produces_no_alert() {
        let registry = LivenessRegistry::new();
        let t0 = Utc::now();
        registry.observe(&heartbeat("A", true, t0), t0).await;

        let t1 = t0 + Duration::minutes(1);
        let transition = registry.observe(&heartbeat("A", false, t1), t1).await;

        assert_eq!(transition.to, StoreStatus::Online);
        assert!(transition.candidate_alert.is_none());
    }

    #[tokio::test]
    async fn sweeper_transitions_stale_online_store_to_offline() {
        let registry = LivenessRegistry::new();
        let t0 = Utc::now();
        registry.observe(&heartbeat("A", true, t0), t0).await;

        let t1 = t0 + Duration::minutes(7);
        let transitions = registry
            .sweep(
                &[StoreId::new("A")],
                t1,
                Duration::minutes(5),
                Duration::seconds(30),
            )
            .await;

        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, StoreStatus::Offline);
        assert!(transitions[0].candidate_alert.as_ref().unwrap().force);
    }

    #[tokio::test]
    async fn sweeper_does_not_fire_exactly_at_threshold_plus_epsilon() {
        let registry = LivenessRegistry::new();
        let t0 = Utc::now();
        registry.observe(&heartbeat("A", true, t0), t0).await;

        let t1 = t0 + Duration::minutes(5) + Duration::seconds(30);
        let transitions = registry
            .sweep(
                &[StoreId::new("A")],
                t1,
                Duration::minutes(5),
                Duration::seconds(30),
            )
            .await;

        assert!(transitions.is_empty());
    }

    #[tokio::test]
    async fn recovery_after_offline_heartbeat_is_recovery_candidate() {
        let registry = LivenessRegistry::new();
        let t0 = Utc::now();
        registry.observe(&heartbeat("A", true, t0), t0).await;
        registry
            .sweep(
                &[StoreId::new("A")],
                t0 + Duration::minutes(7),
                Duration::minutes(5),
                Duration::seconds(30),
            )
            .await;

        let t2 = t0 + Duration::minutes(10);
        let transition = registry.observe(&heartbeat("A", false, t2), t2).await;

        assert_eq!(transition.from, StoreStatus::Offline);
        assert_eq!(
            transition.candidate_alert.unwrap().kind,
            AlertKind::Recovery
        );
    }

    #[tokio::test]
    async fn startup_flag_on_online_store_is_startup_not_recovery() {
        let registry = LivenessRegistry::new();
        let t0 = Utc::now();
        registry.observe(&heartbeat("A", true, t0), t0).await;

        let t1 = t0 + Duration::seconds(5);
        let transition = registry.observe(&heartbeat("A", true, t1), t1).await;

        assert_eq!(transition.from, StoreStatus::Online);
        assert_eq!(
            transition.candidate_alert.unwrap().kind,
            AlertKind::Startup
        );
    }

    #[tokio::test]
    async fn out_of_order_timestamp_does_not_rewind_last_heartbeat() {
        let registry = LivenessRegistry::new();
        let t0 = Utc::now();
        registry.observe(&heartbeat("A", true, t0), t0).await;

        let t1 = t0 + Duration::minutes(5);
        registry.observe(&heartbeat("A", false, t1), t1).await;

        let stale = t0 + Duration::minutes(1);
        let transition = registry.observe(&heartbeat("A", false, stale), stale).await;
        assert_eq!(transition.to, StoreStatus::Online);

        let snapshot = registry.snapshot(&StoreId::new("A")).await.unwrap();
        assert_eq!(snapshot.last_heartbeat.unwrap(), t1);
    }

    #[tokio::test]
    async fn hydrated_store_gets_unknown_status_and_no_alert_until_next_event() {
        let registry = LivenessRegistry::new();
        let now = Utc::now();
        registry.hydrate(StoreId::new("B"), "Hydrated Store".to_string(), now);

        let snapshot = registry.snapshot(&StoreId::new("B")).await.unwrap();
        assert_eq!(snapshot.status, StoreStatus::Unknown);
        assert!(snapshot.last_heartbeat.is_none());
    }

    #[tokio::test]
    async fn first_seen_is_stable_across_observations() {
        let registry = LivenessRegistry::new();
        let t0 = Utc::now();
        registry.observe(&heartbeat("A", true, t0), t0).await;
        let first_seen = registry.snapshot(&StoreId::new("A")).await.unwrap().first_seen;

        let t1 = t0 + Duration::minutes(3);
        registry.observe(&heartbeat("A", false, t1), t1).await;
        let still = registry.snapshot(&StoreId::new("A")).await.unwrap().first_seen;

        assert_eq!(first_seen, still);
    }
}

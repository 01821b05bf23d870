use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommonError;
use crate::ids::StoreId;

/// Telemetry record emitted periodically by a store to signal liveness
/// and report health. Produced by the client's telemetry collector,
/// consumed by the server's ingestion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub store_id: StoreId,
    pub store_name: String,
    pub timestamp: DateTime<Utc>,
    pub is_startup: bool,
    pub system_stats: SystemStats,
    pub camera_status: CameraStatus,
    pub application_stats: ApplicationStats,
    pub location_info: LocationInfo,
    pub network_info: NetworkInfo,
}

impl Heartbeat {
    /// Checks the invariants a well-formed heartbeat must satisfy before
    /// the ingestion endpoint hands it to the liveness registry.
    ///
    /// Monotonic-timestamp-per-process and exactly-one-startup-per-boot
    /// are client-side invariants and are not re-checked here.
    pub fn validate(&self) -> Result<(), CommonError> {
        let cam = &self.camera_status;
        if cam.active_cameras > cam.total_cameras {
            return Err(CommonError::InvalidHeartbeat(format!(
                "active_cameras ({}) exceeds total_cameras ({})",
                cam.active_cameras, cam.total_cameras
            )));
        }

        let pct_fields = [
            ("cpu_percent", self.system_stats.cpu_percent),
            ("memory_percent", self.system_stats.memory_percent),
            ("disk_use_percent", self.system_stats.disk_use_percent),
        ];
        for (name, value) in pct_fields {
            if !(0.0..=100.0).contains(&value) {
                return Err(CommonError::InvalidHeartbeat(format!(
                    "{name} out of range [0,100]: {value}"
                )));
            }
        }

        if self.network_info.recent_speed_samples.len() > 5 {
            return Err(CommonError::InvalidHeartbeat(format!(
                "recent_speed_samples has {} entries, max 5",
                self.network_info.recent_speed_samples.len()
            )));
        }

        if self.store_id.as_str().is_empty() {
            return Err(CommonError::InvalidHeartbeat("store_id is empty".into()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_available_gb: f32,
    pub disk_free_gb: f32,
    pub disk_use_percent: f32,
    pub process_memory_mb: f32,
    pub uptime_hours: f32,
    pub network_connected: bool,
    pub network_speed_mbps: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStatus {
    pub total_cameras: u32,
    pub active_cameras: u32,
    pub cameras: Vec<CameraInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub id: String,
    pub active: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationStats {
    pub last_detection_time: Option<DateTime<Utc>>,
    pub total_detections_today: u64,
    pub app_version: String,
    pub runtime_version: String,
    pub consecutive_failures: u32,
    pub last_successful_connection: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationInfo {
    pub timezone: String,
    pub local_time: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub current_speed_mbps: Option<f32>,
    /// Most recent successful speed samples, oldest first, capped at 5.
    pub recent_speed_samples: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_heartbeat() -> Heartbeat {
        Heartbeat {
            store_id: StoreId::new("store-42"),
            store_name: "Downtown".to_string(),
            timestamp: Utc::now(),
            is_startup: false,
            system_stats: SystemStats {
                cpu_percent: 12.5,
                memory_percent: 40.0,
                memory_available_gb: 8.0,
                disk_free_gb: 100.0,
                disk_use_percent: 55.0,
                process_memory_mb: 256.0,
                uptime_hours: 72.0,
                network_connected: true,
                network_speed_mbps: Some(94.3),
            },
            camera_status: CameraStatus {
                total_cameras: 4,
                active_cameras: 3,
                cameras: vec![CameraInfo {
                    id: "cam-1".to_string(),
                    active: true,
                    error: None,
                }],
            },
            application_stats: ApplicationStats {
                last_detection_time: Some(Utc::now()),
                total_detections_today: 17,
                app_version: "2.3.1".to_string(),
                runtime_version: "1.0.0".to_string(),
                consecutive_failures: 0,
                last_successful_connection: Some(Utc::now()),
            },
            location_info: LocationInfo {
                timezone: "America/Chicago".to_string(),
                local_time: Utc::now().into(),
            },
            network_info: NetworkInfo {
                current_speed_mbps: Some(94.3),
                recent_speed_samples: vec![90.0, 91.2, 94.3],
            },
        }
    }

    #[test]
    fn validate_accepts_well_formed_heartbeat() {
        assert!(sample_heartbeat().validate().is_ok());
    }

    #[test]
    fn validate_rejects_active_cameras_over_total() {
        let mut hb = sample_heartbeat();
        hb.camera_status.active_cameras = 10;
        hb.camera_status.total_cameras = 4;
        assert!(hb.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_percentage() {
        let mut hb = sample_heartbeat();
        hb.system_stats.cpu_percent = 150.0;
        assert!(hb.validate().is_err());
    }

    #[test]
    fn validate_rejects_too_many_speed_samples() {
        let mut hb = sample_heartbeat();
        hb.network_info.recent_speed_samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert!(hb.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_store_id() {
        let mut hb = sample_heartbeat();
        hb.store_id = StoreId::new("");
        assert!(hb.validate().is_err());
    }

    #[test]
    fn heartbeat_round_trips_through_json() {
        let hb = sample_heartbeat();
        let json = serde_json::to_string(&hb).unwrap();
        let reloaded: Heartbeat = serde_json::from_str(&json).unwrap();

        assert_eq!(hb.store_id, reloaded.store_id);
        assert_eq!(hb.is_startup, reloaded.is_startup);
        assert_eq!(
            hb.system_stats.cpu_percent,
            reloaded.system_stats.cpu_percent
        );
        assert_eq!(
            hb.camera_status.active_cameras,
            reloaded.camera_status.active_cameras
        );
        assert_eq!(
            hb.network_info.recent_speed_samples,
            reloaded.network_info.recent_speed_samples
        );
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Row shape of the `stores` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoreRow {
    pub store_id: String,
    pub store_name: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub status: String,
    pub last_alert_sent: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape of the `heartbeat_history` table.
#[derive(Debug, Clone, FromRow)]
pub struct HeartbeatHistoryRow {
    pub id: Uuid,
    pub store_id: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f32,
    pub memory_usage: f32,
    pub disk_free_gb: f32,
    pub active_cameras: i32,
    pub total_cameras: i32,
    pub network_connected: bool,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Row shape of the `system_stats` table.
#[derive(Debug, Clone, FromRow)]
pub struct SystemStatsRow {
    pub id: Uuid,
    pub store_id: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f32,
    pub memory_usage: f32,
    pub memory_available_gb: f32,
    pub disk_free_gb: f32,
    pub disk_usage_percent: f32,
    pub process_memory_mb: f32,
    pub uptime_hours: f32,
    pub network_connected: bool,
    pub created_at: DateTime<Utc>,
}

/// Row shape of the `alerts` table. `alert_type` is stored as text and
/// parsed back into `PersistedAlertKind` by callers that need the enum.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AlertRow {
    pub id: Uuid,
    pub store_id: String,
    pub alert_type: String,
    pub message: String,
    pub severity: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

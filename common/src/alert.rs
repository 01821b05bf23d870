use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::StoreId;

/// Full-fidelity alert classification used in memory and in dispatch
/// logic. Persisted storage uses the narrower [`PersistedAlertKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Startup,
    Recovery,
    Offline,
    SystemWarning,
    CameraFailure,
    Test,
}

impl AlertKind {
    /// Maps the in-memory kind onto the persisted `alerts.alert_type`
    /// taxonomy, which lacks `startup` and `recovery`. See DESIGN.md for
    /// why this lossy mapping was kept rather than widening the schema.
    pub fn to_persisted(self) -> PersistedAlertKind {
        match self {
            AlertKind::Startup | AlertKind::Test => PersistedAlertKind::Test,
            AlertKind::Recovery => PersistedAlertKind::Test,
            AlertKind::Offline => PersistedAlertKind::Offline,
            AlertKind::SystemWarning => PersistedAlertKind::SystemWarning,
            AlertKind::CameraFailure => PersistedAlertKind::CameraFailure,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Startup => "startup",
            AlertKind::Recovery => "recovery",
            AlertKind::Offline => "offline",
            AlertKind::SystemWarning => "system_warning",
            AlertKind::CameraFailure => "camera_failure",
            AlertKind::Test => "test",
        }
    }
}

/// The enum actually stored in the `alerts.alert_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistedAlertKind {
    Offline,
    SystemWarning,
    CameraFailure,
    Test,
}

impl PersistedAlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PersistedAlertKind::Offline => "offline",
            PersistedAlertKind::SystemWarning => "system_warning",
            PersistedAlertKind::CameraFailure => "camera_failure",
            PersistedAlertKind::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "offline" => Some(PersistedAlertKind::Offline),
            "system_warning" => Some(PersistedAlertKind::SystemWarning),
            "camera_failure" => Some(PersistedAlertKind::CameraFailure),
            "test" => Some(PersistedAlertKind::Test),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// A persisted, append-only alert record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub store_id: StoreId,
    pub kind: AlertKind,
    pub message: String,
    pub severity: Severity,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Builds the message actually written to `alerts.message`, prefixing
    /// the true in-memory kind so it survives the lossy persisted-enum
    /// mapping even though the column can't distinguish `startup` from
    /// `recovery` from `test`.
    pub fn persisted_message(&self) -> String {
        format!("[{}] {}", self.kind.as_str(), self.message)
    }
}

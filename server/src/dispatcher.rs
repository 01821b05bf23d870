use std::sync::Arc;

use chrono::{Duration, Utc};
use storewatch_common::{Alert, AlertKind, Heartbeat, Severity, StoreId};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use uuid::Uuid;

use crate::cooldown::CooldownTable;
use crate::database::DatabaseService;
use crate::error::Result;
use crate::notifier::{NotificationJob, NotificationMessage};
use crate::recipients::RecipientDirectory;

/// Everything `AlertDispatcher::dispatch` needs to classify, persist, and
/// notify. A `Transition`'s `candidate_alert` is turned into one of these
/// by the caller (ingestion handler or sweeper) before reaching here.
pub struct DispatchRequest {
    pub store_id: StoreId,
    pub store_name: String,
    pub kind: AlertKind,
    pub force: bool,
    pub telemetry: Option<Heartbeat>,
}

fn cooldown_for(kind: AlertKind, cfg_offline: i64, cfg_recovery: i64, cfg_startup: i64) -> Duration {
    match kind {
        AlertKind::Offline => Duration::minutes(cfg_offline),
        AlertKind::Recovery => Duration::minutes(cfg_recovery),
        AlertKind::Startup => Duration::minutes(cfg_startup),
        // Other kinds are dispatched directly (e.g. a test alert) and
        // don't participate in cooldown gating.
        _ => Duration::zero(),
    }
}

fn severity_for(kind: AlertKind) -> Severity {
    match kind {
        AlertKind::Offline => Severity::Critical,
        AlertKind::Recovery => Severity::Medium,
        AlertKind::Startup => Severity::Low,
        AlertKind::SystemWarning => Severity::Medium,
        AlertKind::CameraFailure => Severity::Medium,
        AlertKind::Test => Severity::Low,
    }
}

fn render_message(req: &DispatchRequest) -> String {
    match req.kind {
        AlertKind::Offline => format!(
            "Store '{}' ({}) has stopped sending heartbeats and is considered offline.",
            req.store_name, req.store_id
        ),
        AlertKind::Recovery => format!(
            "Store '{}' ({}) has resumed sending heartbeats.",
            req.store_name, req.store_id
        ),
        AlertKind::Startup => format!(
            "Store '{}' ({}) has started reporting.",
            req.store_name, req.store_id
        ),
        AlertKind::SystemWarning => format!("Store '{}' reported a system warning.", req.store_name),
        AlertKind::CameraFailure => format!("Store '{}' reported a camera failure.", req.store_name),
        AlertKind::Test => format!("Test alert for store '{}'.", req.store_name),
    }
}

fn render_body(req: &DispatchRequest, message: &str) -> String {
    match (&req.kind, &req.telemetry) {
        (AlertKind::Offline, _) => format!(
            "{message}\n\nNo telemetry is available — this is what makes it offline."
        ),
        (_, Some(hb)) => format!(
            "{message}\n\nCPU: {:.1}%\nMemory: {:.1}%\nDisk: {:.1}%\nCameras: {}/{}",
            hb.system_stats.cpu_percent,
            hb.system_stats.memory_percent,
            hb.system_stats.disk_use_percent,
            hb.camera_status.active_cameras,
            hb.camera_status.total_cameras,
        ),
        (_, None) => message.to_string(),
    }
}

pub struct AlertDispatcher {
    db: Arc<DatabaseService>,
    cooldown: Arc<CooldownTable>,
    recipients: Arc<RecipientDirectory>,
    notify_tx: UnboundedSender<NotificationJob>,
    offline_cooldown_minutes: i64,
    recovery_cooldown_minutes: i64,
    startup_cooldown_minutes: i64,
}

impl AlertDispatcher {
    pub fn new(
        db: Arc<DatabaseService>,
        cooldown: Arc<CooldownTable>,
        recipients: Arc<RecipientDirectory>,
        notify_tx: UnboundedSender<NotificationJob>,
        offline_cooldown_minutes: i64,
        recovery_cooldown_minutes: i64,
        startup_cooldown_minutes: i64,
    ) -> Self {
        Self {
            db,
            cooldown,
            recipients,
            notify_tx,
            offline_cooldown_minutes,
            recovery_cooldown_minutes,
            startup_cooldown_minutes,
        }
    }

    /// Persists and (cooldown permitting) notifies for `req`. Returns
    /// `Ok(None)` when the cooldown suppressed the alert entirely — no
    /// row is written for a suppressed alert, only for one that fires.
    pub async fn dispatch(&self, req: DispatchRequest) -> Result<Option<Uuid>> {
        let now = Utc::now();
        let cooldown = cooldown_for(
            req.kind,
            self.offline_cooldown_minutes,
            self.recovery_cooldown_minutes,
            self.startup_cooldown_minutes,
        );

        let fires = if cooldown.is_zero() {
            true
        } else {
            self.cooldown
                .try_fire(req.kind, &req.store_id, cooldown, now, req.force)
        };

        if !fires {
            return Ok(None);
        }

        let message = render_message(&req);
        let severity = severity_for(req.kind);
        let alert = Alert {
            id: Uuid::new_v4(),
            store_id: req.store_id.clone(),
            kind: req.kind,
            message: message.clone(),
            severity,
            resolved: false,
            resolved_at: None,
            timestamp: now,
        };

        self.db.insert_alert(&alert).await?;

        let recipients = self.recipients.recipients_for(&req.store_id);
        if recipients.is_empty() {
            warn!(store_id = %req.store_id, "no recipients configured, alert persisted without notification");
        }

        let body = render_body(&req, &message);
        let notification = NotificationMessage {
            subject: format!("[StoreWatch] {} - {}", req.kind.as_str(), req.store_name),
            body,
        };

        if self
            .notify_tx
            .send(NotificationJob {
                recipients,
                message: notification,
            })
            .is_err()
        {
            warn!("notification worker channel closed, dropping notification");
        }

        Ok(Some(alert.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_alerts_are_critical_severity() {
        assert_eq!(severity_for(AlertKind::Offline), Severity::Critical);
    }

    #[test]
    fn recovery_alerts_are_medium_severity() {
        assert_eq!(severity_for(AlertKind::Recovery), Severity::Medium);
    }

    #[test]
    fn startup_alerts_are_low_severity() {
        assert_eq!(severity_for(AlertKind::Startup), Severity::Low);
    }
}

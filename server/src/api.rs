use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use storewatch_common::{AlertKind, Heartbeat, StoreId};
use tracing::error;

use crate::dispatcher::DispatchRequest;
use crate::error::{Result, ServerError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

fn default_limit(q: &AlertsQuery) -> i64 {
    q.limit.unwrap_or(50).clamp(1, 500)
}

async fn ingest(state: &AppState, heartbeat: Heartbeat) -> Result<impl IntoResponse> {
    heartbeat.validate()?;

    let transition = state.registry.observe(&heartbeat, Utc::now()).await;

    if let Err(err) = state.db.record_heartbeat(&heartbeat, transition.to).await {
        error!(store_id = %heartbeat.store_id, error = %err, "failed to persist heartbeat, ingestion still acked");
    }

    if let Some(candidate) = transition.candidate_alert {
        let result = state
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
            error!(store_id = %transition.store_id, error = %err, "failed to dispatch alert");
        }
    }

    let total_stores_monitored = state.registry.known_store_ids().len();
    Ok(Json(serde_json::json!({
        "status": "ok",
        "total_stores_monitored": total_stores_monitored,
    })))
}

pub async fn ingest_live(
    State(state): State<AppState>,
    Json(heartbeat): Json<Heartbeat>,
) -> Result<impl IntoResponse> {
    ingest(&state, heartbeat).await
}

/// Replay ingestion. Ack is idempotent by design — a duplicate submission
/// may produce an additional history row (documented at-least-once
/// behaviour, not deduplicated).
pub async fn ingest_buffered(
    State(state): State<AppState>,
    Json(heartbeat): Json<Heartbeat>,
) -> Result<impl IntoResponse> {
    ingest(&state, heartbeat).await
}

pub async fn dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let snapshots = state.registry.all_snapshots().await;

    let mut online = 0;
    let mut offline = 0;
    let mut unknown = 0;
    for s in &snapshots {
        match s.status {
            storewatch_common::StoreStatus::Online => online += 1,
            storewatch_common::StoreStatus::Offline => offline += 1,
            storewatch_common::StoreStatus::Unknown => unknown += 1,
        }
    }

    let stores: Vec<_> = snapshots
        .iter()
        .map(|s| {
            serde_json::json!({
                "store_id": s.store_id,
                "store_name": s.store_name,
                "status": s.status.to_string(),
                "last_heartbeat": s.last_heartbeat,
                "first_seen": s.first_seen,
            })
        })
        .collect();

    Json(serde_json::json!({
        "stores": stores,
        "summary": {
            "total": snapshots.len(),
            "online": online,
            "offline": offline,
            "unknown": unknown,
            "last_updated": Utc::now(),
        }
    }))
}

pub async fn get_store(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<impl IntoResponse> {
    let store_id = StoreId::new(store_id);
    let snapshot = state
        .registry
        .snapshot(&store_id)
        .await
        .ok_or_else(|| ServerError::NotFound(store_id.to_string()))?;

    Ok(Json(serde_json::json!({
        "store_id": snapshot.store_id,
        "store_name": snapshot.store_name,
        "status": snapshot.status.to_string(),
        "is_online": snapshot.status == storewatch_common::StoreStatus::Online,
        "last_heartbeat": snapshot.last_heartbeat,
        "first_seen": snapshot.first_seen,
        "latest_metrics": snapshot.latest_metrics,
    })))
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<impl IntoResponse> {
    let rows = state.db.list_alerts(default_limit(&query)).await?;
    Ok(Json(rows))
}

pub async fn list_alerts_for_store(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Query(query): Query<AlertsQuery>,
) -> Result<impl IntoResponse> {
    let rows = state
        .db
        .list_alerts_for_store(&StoreId::new(store_id), default_limit(&query))
        .await?;
    Ok(Json(rows))
}

pub async fn trigger_health_check(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.sweeper.hydrate_from_db().await?;
    state.sweeper.run_once().await;
    Ok(Json(serde_json::json!({ "status": "triggered" })))
}

pub async fn test_email(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<impl IntoResponse> {
    let store_id = StoreId::new(store_id);
    let store_name = state
        .registry
        .snapshot(&store_id)
        .await
        .map(|s| s.store_name)
        .unwrap_or_else(|| store_id.to_string());

    let alert_id = state
        .dispatcher
        .dispatch(DispatchRequest {
            store_id,
            store_name,
            kind: AlertKind::Offline,
            force: true,
            telemetry: None,
        })
        .await?;

    Ok(Json(serde_json::json!({ "status": "sent", "alert_id": alert_id })))
}

pub async fn get_email_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.recipients.snapshot())
}

pub async fn reload_email_config(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.recipients.reload()?;
    Ok(Json(serde_json::json!({ "status": "reloaded" })))
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "storewatch-server",
        "timestamp": Utc::now(),
    }))
}

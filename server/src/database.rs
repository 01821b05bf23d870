use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use storewatch_common::{Alert, Heartbeat, StoreId, StoreStatus};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AlertRow, StoreRow};

/// Thin wrapper over `sqlx::PgPool`. The relational schema is treated as
/// an opaque append + upsert log — no migration framework, no ORM-style
/// entity graph, schema created inline at startup.
pub struct DatabaseService {
    pool: PgPool,
}

impl DatabaseService {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables this service needs if they don't already exist.
    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stores (
                store_id TEXT PRIMARY KEY,
                store_name TEXT NOT NULL,
                last_heartbeat TIMESTAMPTZ,
                status TEXT NOT NULL,
                last_alert_sent TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS heartbeat_history (
                id UUID PRIMARY KEY,
                store_id TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                cpu_usage REAL NOT NULL,
                memory_usage REAL NOT NULL,
                disk_free_gb REAL NOT NULL,
                active_cameras INT NOT NULL,
                total_cameras INT NOT NULL,
                network_connected BOOLEAN NOT NULL,
                payload JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_stats (
                id UUID PRIMARY KEY,
                store_id TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                cpu_usage REAL NOT NULL,
                memory_usage REAL NOT NULL,
                memory_available_gb REAL NOT NULL,
                disk_free_gb REAL NOT NULL,
                disk_usage_percent REAL NOT NULL,
                process_memory_mb REAL NOT NULL,
                uptime_hours REAL NOT NULL,
                network_connected BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id UUID PRIMARY KEY,
                store_id TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                message TEXT NOT NULL,
                severity TEXT NOT NULL,
                resolved BOOLEAN NOT NULL DEFAULT FALSE,
                resolved_at TIMESTAMPTZ,
                timestamp TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upserts the store row and appends history/system_stats rows for
    /// one accepted heartbeat, all in a single transaction.
    pub async fn record_heartbeat(&self, heartbeat: &Heartbeat, status: StoreStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO stores (store_id, store_name, last_heartbeat, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (store_id) DO UPDATE SET
                store_name = EXCLUDED.store_name,
                last_heartbeat = EXCLUDED.last_heartbeat,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(heartbeat.store_id.as_str())
        .bind(&heartbeat.store_name)
        .bind(heartbeat.timestamp)
        .bind(status.to_string())
        .execute(&mut *tx)
        .await?;

        let payload = serde_json::to_value(heartbeat)?;
        sqlx::query(
            r#"
            INSERT INTO heartbeat_history
                (id, store_id, timestamp, cpu_usage, memory_usage, disk_free_gb,
                 active_cameras, total_cameras, network_connected, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(heartbeat.store_id.as_str())
        .bind(heartbeat.timestamp)
        .bind(heartbeat.system_stats.cpu_percent)
        .bind(heartbeat.system_stats.memory_percent)
        .bind(heartbeat.system_stats.disk_free_gb)
        .bind(heartbeat.camera_status.active_cameras as i32)
        .bind(heartbeat.camera_status.total_cameras as i32)
        .bind(heartbeat.system_stats.network_connected)
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO system_stats
                (id, store_id, timestamp, cpu_usage, memory_usage, memory_available_gb,
                 disk_free_gb, disk_usage_percent, process_memory_mb, uptime_hours,
                 network_connected, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(heartbeat.store_id.as_str())
        .bind(heartbeat.timestamp)
        .bind(heartbeat.system_stats.cpu_percent)
        .bind(heartbeat.system_stats.memory_percent)
        .bind(heartbeat.system_stats.memory_available_gb)
        .bind(heartbeat.system_stats.disk_free_gb)
        .bind(heartbeat.system_stats.disk_use_percent)
        .bind(heartbeat.system_stats.process_memory_mb)
        .bind(heartbeat.system_stats.uptime_hours)
        .bind(heartbeat.system_stats.network_connected)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn update_store_status(&self, store_id: &StoreId, status: StoreStatus) -> Result<()> {
        sqlx::query("UPDATE stores SET status = $1, updated_at = NOW() WHERE store_id = $2")
            .bind(status.to_string())
            .bind(store_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (id, store_id, alert_type, message, severity, resolved, resolved_at, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(alert.id)
        .bind(alert.store_id.as_str())
        .bind(alert.kind.to_persisted().as_str())
        .bind(alert.persisted_message())
        .bind(alert.severity.as_str())
        .bind(alert.resolved)
        .bind(alert.resolved_at)
        .bind(alert.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_store(&self, store_id: &StoreId) -> Result<Option<StoreRow>> {
        let row = sqlx::query_as::<_, StoreRow>("SELECT * FROM stores WHERE store_id = $1")
            .bind(store_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_stores(&self) -> Result<Vec<StoreRow>> {
        let rows = sqlx::query_as::<_, StoreRow>("SELECT * FROM stores ORDER BY store_name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Store ids known to persistence, used by the sweeper to hydrate
    /// stores it hasn't observed this process lifetime.
    pub async fn list_store_ids(&self) -> Result<Vec<(StoreId, String, DateTime<Utc>)>> {
        let rows: Vec<(String, String, DateTime<Utc>)> =
            sqlx::query_as("SELECT store_id, store_name, created_at FROM stores")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, created_at)| (StoreId::new(id), name, created_at))
            .collect())
    }

    pub async fn list_alerts(&self, limit: i64) -> Result<Vec<AlertRow>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM alerts ORDER BY timestamp DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_alerts_for_store(&self, store_id: &StoreId, limit: i64) -> Result<Vec<AlertRow>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM alerts WHERE store_id = $1 ORDER BY timestamp DESC LIMIT $2",
        )
        .bind(store_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

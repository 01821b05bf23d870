use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::warn;

use crate::error::Result;

/// One locally persisted heartbeat awaiting delivery.
#[derive(Debug, Clone)]
pub struct BufferedHeartbeat {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub payload: String,
    pub sent: bool,
}

/// Durable local queue of heartbeats that couldn't be delivered live.
/// Replayed in ascending order; `sent = true` entries are eligible for
/// GC after a retention window.
#[async_trait]
pub trait HeartbeatBuffer: Send + Sync {
    async fn enqueue(&self, payload: &str) -> Result<()>;
    async fn peek(&self, n: i64) -> Result<Vec<BufferedHeartbeat>>;
    async fn mark_sent(&self, id: i64) -> Result<()>;
    async fn gc(&self, retention: Duration) -> Result<()>;
}

pub struct SqliteBuffer {
    pool: SqlitePool,
}

impl SqliteBuffer {
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS heartbeat_buffer (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                data TEXT NOT NULL,
                sent BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl HeartbeatBuffer for SqliteBuffer {
    async fn enqueue(&self, payload: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO heartbeat_buffer (timestamp, data, sent, created_at) VALUES (?, ?, 0, ?)",
        )
        .bind(now.to_rfc3339())
        .bind(payload)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn peek(&self, n: i64) -> Result<Vec<BufferedHeartbeat>> {
        let rows: Vec<(i64, String, String, bool)> = sqlx::query_as(
            "SELECT id, timestamp, data, sent FROM heartbeat_buffer WHERE sent = 0 ORDER BY id ASC LIMIT ?",
        )
        .bind(n)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, timestamp, data, sent)| BufferedHeartbeat {
                id,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                payload: data,
                sent,
            })
            .collect())
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE heartbeat_buffer SET sent = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn gc(&self, retention: Duration) -> Result<()> {
        let cutoff = (Utc::now() - retention).to_rfc3339();
        sqlx::query("DELETE FROM heartbeat_buffer WHERE sent = 1 AND created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory fallback used when the SQLite file can't be opened
/// (permissions, disk full). Capped at 100 entries, trimmed to 50 on
/// overflow — durability is degraded and this is logged at construction.
pub struct RingBufferFallback {
    entries: tokio::sync::Mutex<VecDeque<BufferedHeartbeat>>,
    next_id: std::sync::atomic::AtomicI64,
}

const RING_CAPACITY: usize = 100;
const RING_TRIM_TO: usize = 50;

impl RingBufferFallback {
    pub fn new() -> Self {
        warn!("heartbeat buffer falling back to in-memory ring, durability is degraded");
        Self {
            entries: tokio::sync::Mutex::new(VecDeque::new()),
            next_id: std::sync::atomic::AtomicI64::new(1),
        }
    }
}

impl Default for RingBufferFallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HeartbeatBuffer for RingBufferFallback {
    async fn enqueue(&self, payload: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        entries.push_back(BufferedHeartbeat {
            id,
            timestamp: Utc::now(),
            payload: payload.to_string(),
            sent: false,
        });

        if entries.len() > RING_CAPACITY {
            while entries.len() > RING_TRIM_TO {
                entries.pop_front();
            }
        }
        Ok(())
    }

    async fn peek(&self, n: i64) -> Result<Vec<BufferedHeartbeat>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|e| !e.sent)
            .take(n.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.sent = true;
        }
        Ok(())
    }

    async fn gc(&self, retention: Duration) -> Result<()> {
        let cutoff = Utc::now() - retention;
        let mut entries = self.entries.lock().await;
        entries.retain(|e| !(e.sent && e.timestamp < cutoff));
        Ok(())
    }
}

/// Opens a durable `SqliteBuffer` at `path`, falling back to an
/// in-memory ring (with a logged warning) if the file can't be opened.
pub async fn open_buffer(path: &Path) -> Box<dyn HeartbeatBuffer> {
    match SqliteBuffer::open(path).await {
        Ok(buffer) => Box::new(buffer),
        Err(err) => {
            warn!(error = %err, path = ?path, "failed to open sqlite heartbeat buffer");
            Box::new(RingBufferFallback::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sqlite_buffer_round_trips_enqueue_and_mark_sent() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = SqliteBuffer::open(&dir.path().join("buf.db")).await.unwrap();

        buffer.enqueue("{\"a\":1}").await.unwrap();
        let pending = buffer.peek(10).await.unwrap();
        assert_eq!(pending.len(), 1);

        buffer.mark_sent(pending[0].id).await.unwrap();
        let pending = buffer.peek(10).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn sqlite_buffer_peek_respects_ascending_order() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = SqliteBuffer::open(&dir.path().join("buf.db")).await.unwrap();

        buffer.enqueue("first").await.unwrap();
        buffer.enqueue("second").await.unwrap();

        let pending = buffer.peek(10).await.unwrap();
        assert_eq!(pending[0].payload, "first");
        assert_eq!(pending[1].payload, "second");
    }

    #[tokio::test]
    async fn ring_buffer_trims_on_overflow() {
        let buffer = RingBufferFallback::new();
        for i in 0..120 {
            buffer.enqueue(&format!("payload-{i}")).await.unwrap();
        }
        let pending = buffer.peek(1000).await.unwrap();
        assert!(pending.len() <= RING_CAPACITY);
    }

    #[tokio::test]
    async fn ring_buffer_gc_removes_only_sent_expired_entries() {
        let buffer = RingBufferFallback::new();
        buffer.enqueue("a").await.unwrap();
        let pending = buffer.peek(10).await.unwrap();
        buffer.mark_sent(pending[0].id).await.unwrap();

        buffer.gc(Duration::seconds(-1)).await.unwrap();
        let all = buffer.entries.lock().await;
        assert!(all.is_empty());
    }
}

use std::time::Duration as StdDuration;

use chrono::Duration;
use reqwest::Client;
use storewatch_common::Heartbeat;
use tracing::{error, info, warn};

use crate::buffer::HeartbeatBuffer;
use crate::collector::{ApplicationCounters, TelemetryCollector};

const BUFFER_DRAIN_BATCH: i64 = 10;
const GC_RETENTION: Duration = Duration::hours(24);
const MAINTENANCE_INTERVAL: StdDuration = StdDuration::from_secs(30 * 60);

/// Periodic driver: collects telemetry, ships it live, buffers on
/// failure, and drains the buffer after every successful live send.
pub struct HeartbeatShipper {
    server_url: String,
    live_client: Client,
    replay_client: Client,
    collector: TelemetryCollector,
    buffer: Box<dyn HeartbeatBuffer>,
    interval: StdDuration,
    startup_pending: bool,
    consecutive_failures: u32,
}

impl HeartbeatShipper {
    pub fn new(
        server_url: String,
        collector: TelemetryCollector,
        buffer: Box<dyn HeartbeatBuffer>,
        interval: StdDuration,
    ) -> Self {
        Self {
            server_url,
            live_client: Client::builder()
                .timeout(StdDuration::from_secs(10))
                .build()
                .expect("failed to build live heartbeat client"),
            replay_client: Client::builder()
                .timeout(StdDuration::from_secs(5))
                .build()
                .expect("failed to build buffered replay client"),
            collector,
            buffer,
            interval,
            startup_pending: true,
            consecutive_failures: 0,
        }
    }

    /// Runs one shipper tick: collect, ship live, on failure buffer,
    /// on success drain the buffer.
    pub async fn tick(&mut self, counters: &ApplicationCounters) {
        let heartbeat = self
            .collector
            .collect(counters, self.startup_pending)
            .await;

        match self.send_live(&heartbeat).await {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.startup_pending = false;
                self.drain_buffer().await;
            }
            Err(err) => {
                self.consecutive_failures += 1;
                warn!(error = %err, "live heartbeat send failed, buffering");
                if let Ok(payload) = serde_json::to_string(&heartbeat) {
                    if let Err(err) = self.buffer.enqueue(&payload).await {
                        warn!(error = %err, "failed to enqueue heartbeat into local buffer");
                    }
                }
            }
        }
    }

    async fn send_live(&self, heartbeat: &Heartbeat) -> Result<(), reqwest::Error> {
        let url = format!("{}/heartbeat", self.server_url);
        let response = self.live_client.post(&url).json(heartbeat).send().await?;
        response.error_for_status().map(|_| ())
    }

    /// Drains up to `BUFFER_DRAIN_BATCH` pending entries. The first
    /// network-class failure aborts the loop, leaving the rest for the
    /// next tick; a rejected entry (4xx) is skipped since retrying it
    /// will not help.
    async fn drain_buffer(&mut self) {
        let pending = match self.buffer.peek(BUFFER_DRAIN_BATCH).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "failed to read pending buffered heartbeats");
                return;
            }
        };

        let url = format!("{}/heartbeat/buffered", self.server_url);
        for entry in pending {
            let response = self
                .replay_client
                .post(&url)
                .header("content-type", "application/json")
                .body(entry.payload.clone())
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    if let Err(err) = self.buffer.mark_sent(entry.id).await {
                        warn!(error = %err, "failed to mark buffered heartbeat sent");
                    }
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "server rejected buffered heartbeat, skipping");
                    if let Err(err) = self.buffer.mark_sent(entry.id).await {
                        warn!(error = %err, "failed to mark rejected heartbeat sent");
                    }
                }
                Err(err) => {
                    warn!(error = %err, "buffer drain aborted by network failure, retrying next tick");
                    break;
                }
            }
        }
    }

    pub async fn run_maintenance(&self) {
        if let Err(err) = self.buffer.gc(GC_RETENTION).await {
            warn!(error = %err, "buffer garbage collection failed");
        }
    }

    /// Runs the shipper loop until a shutdown signal arrives, draining
    /// the buffer one final time before returning.
    pub async fn run(mut self, counters_source: impl Fn() -> ApplicationCounters) {
        let mut ticker = tokio::time::interval(self.interval);
        let mut maintenance = tokio::time::interval(MAINTENANCE_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let counters = counters_source();
                    self.tick(&counters).await;
                }
                _ = maintenance.tick() => {
                    self.run_maintenance().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received, draining buffer");
                    self.drain_buffer().await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RingBufferFallback;
    use storewatch_common::StoreId;

    fn test_shipper(server_url: String) -> HeartbeatShipper {
        HeartbeatShipper::new(
            server_url,
            TelemetryCollector::new(StoreId::new("store-1"), "Test".to_string()),
            Box::new(RingBufferFallback::new()),
            StdDuration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn first_tick_is_flagged_as_startup() {
        let mut shipper = test_shipper("http://127.0.0.1:1".to_string());
        let counters = ApplicationCounters::default();

        shipper.tick(&counters).await;
        assert!(shipper.startup_pending, "unreachable server keeps startup_pending set");
    }

    #[tokio::test]
    async fn failed_send_enqueues_into_buffer() {
        let mut shipper = test_shipper("http://127.0.0.1:1".to_string());
        let counters = ApplicationCounters::default();

        shipper.tick(&counters).await;
        let pending = shipper.buffer.peek(10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}

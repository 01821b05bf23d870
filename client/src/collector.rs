use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use storewatch_common::{
    ApplicationStats, CameraInfo, CameraStatus, Heartbeat, LocationInfo, NetworkInfo, StoreId,
    SystemStats,
};
use sysinfo::{Disks, System};
use tracing::warn;

/// External counters the collector reads but never mutates — owned by
/// whatever application logic runs alongside the shipper.
#[derive(Debug, Clone, Default)]
pub struct ApplicationCounters {
    pub last_detection_time: Option<chrono::DateTime<Utc>>,
    pub total_detections_today: u64,
    pub app_version: String,
    pub runtime_version: String,
    pub consecutive_failures: u32,
    pub last_successful_connection: Option<chrono::DateTime<Utc>>,
    pub cameras: Vec<CameraInfo>,
}

const NETWORK_PROBE_URLS: &[&str] = &[
    "https://www.google.com/generate_204",
    "https://www.cloudflare.com/cdn-cgi/trace",
];
const NETWORK_PROBE_INTERVAL: Duration = Duration::from_secs(30 * 60);
const NETWORK_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_SPEED_SAMPLES: usize = 5;

/// Amortized network-speed sampler: the probe only runs on the first
/// `collect()` call after process start and then on a 30-minute cadence.
struct NetworkSpeedSampler {
    client: Client,
    last_sampled: Option<Instant>,
    last_result: Option<f32>,
    recent_samples: VecDeque<f32>,
}

impl NetworkSpeedSampler {
    fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(NETWORK_PROBE_TIMEOUT)
                .build()
                .expect("failed to build network probe client"),
            last_sampled: None,
            last_result: None,
            recent_samples: VecDeque::with_capacity(MAX_SPEED_SAMPLES),
        }
    }

    async fn sample(&mut self) -> Option<f32> {
        let due = self
            .last_sampled
            .map(|t| t.elapsed() >= NETWORK_PROBE_INTERVAL)
            .unwrap_or(true);
        if !due {
            return self.last_result;
        }

        self.last_sampled = Some(Instant::now());

        let mut throughputs = Vec::new();
        for url in NETWORK_PROBE_URLS {
            let start = Instant::now();
            match self.client.get(*url).send().await {
                Ok(resp) => match resp.bytes().await {
                    Ok(bytes) => {
                        let elapsed = start.elapsed().as_secs_f32().max(0.001);
                        let mbps = (bytes.len() as f32 * 8.0) / elapsed / 1_000_000.0;
                        throughputs.push(mbps);
                    }
                    Err(err) => warn!(url, error = %err, "network probe body read failed"),
                },
                Err(err) => warn!(url, error = %err, "network probe request failed"),
            }
        }

        if throughputs.is_empty() {
            self.last_result = None;
            return None;
        }

        let avg = throughputs.iter().sum::<f32>() / throughputs.len() as f32;
        self.last_result = Some(avg);

        if self.recent_samples.len() == MAX_SPEED_SAMPLES {
            self.recent_samples.pop_front();
        }
        self.recent_samples.push_back(avg);

        Some(avg)
    }
}

/// Samples OS and application metrics into a `Heartbeat` record. Never
/// fails the caller — on inability to read a metric, that field is left
/// `None`/zeroed rather than propagating an error.
pub struct TelemetryCollector {
    store_id: StoreId,
    store_name: String,
    system: System,
    disks: Disks,
    started_at: Instant,
    network_sampler: NetworkSpeedSampler,
}

impl TelemetryCollector {
    pub fn new(store_id: StoreId, store_name: String) -> Self {
        Self {
            store_id,
            store_name,
            system: System::new_all(),
            disks: Disks::new_with_refreshed_list(),
            started_at: Instant::now(),
            network_sampler: NetworkSpeedSampler::new(),
        }
    }

    pub async fn collect(&mut self, counters: &ApplicationCounters, is_startup: bool) -> Heartbeat {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.disks.refresh();

        let cpus = self.system.cpus();
        let cpu_percent = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };
        let total_memory = self.system.total_memory();
        let used_memory = self.system.used_memory();
        let memory_percent = if total_memory > 0 {
            (used_memory as f32 / total_memory as f32) * 100.0
        } else {
            0.0
        };
        let memory_available_gb =
            (total_memory.saturating_sub(used_memory)) as f32 / 1024.0 / 1024.0 / 1024.0;

        let (disk_free_gb, disk_use_percent) = self
            .disks
            .list()
            .first()
            .map(|d| {
                let total = d.total_space();
                let available = d.available_space();
                let used_percent = if total > 0 {
                    ((total - available) as f32 / total as f32) * 100.0
                } else {
                    0.0
                };
                (available as f32 / 1024.0 / 1024.0 / 1024.0, used_percent)
            })
            .unwrap_or((0.0, 0.0));

        let process_memory_mb = sysinfo::get_current_pid()
            .ok()
            .and_then(|pid| self.system.process(pid))
            .map(|p| p.memory() as f32 / 1024.0 / 1024.0)
            .unwrap_or(0.0);

        let network_speed_mbps = self.network_sampler.sample().await;
        let recent_speed_samples = self.network_sampler.recent_samples.iter().copied().collect();

        let now = Utc::now();
        Heartbeat {
            store_id: self.store_id.clone(),
            store_name: self.store_name.clone(),
            timestamp: now,
            is_startup,
            system_stats: SystemStats {
                cpu_percent,
                memory_percent,
                memory_available_gb,
                disk_free_gb,
                disk_use_percent,
                process_memory_mb,
                uptime_hours: self.started_at.elapsed().as_secs_f32() / 3600.0,
                network_connected: network_speed_mbps.is_some(),
                network_speed_mbps,
            },
            camera_status: CameraStatus {
                total_cameras: counters.cameras.len() as u32,
                active_cameras: counters.cameras.iter().filter(|c| c.active).count() as u32,
                cameras: counters.cameras.clone(),
            },
            application_stats: ApplicationStats {
                last_detection_time: counters.last_detection_time,
                total_detections_today: counters.total_detections_today,
                app_version: counters.app_version.clone(),
                runtime_version: counters.runtime_version.clone(),
                consecutive_failures: counters.consecutive_failures,
                last_successful_connection: counters.last_successful_connection,
            },
            location_info: LocationInfo {
                timezone: "UTC".to_string(),
                local_time: now.into(),
            },
            network_info: NetworkInfo {
                current_speed_mbps: network_speed_mbps,
                recent_speed_samples,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_produces_well_formed_heartbeat() {
        let mut collector = TelemetryCollector::new(StoreId::new("store-1"), "Test".to_string());
        let counters = ApplicationCounters {
            app_version: "1.0".to_string(),
            runtime_version: "1.0".to_string(),
            ..Default::default()
        };

        let heartbeat = collector.collect(&counters, true).await;
        assert!(heartbeat.is_startup);
        assert_eq!(heartbeat.store_id, StoreId::new("store-1"));
        assert!(heartbeat.validate().is_ok());
    }

    #[tokio::test]
    async fn recent_speed_samples_never_exceeds_cap() {
        let mut sampler = NetworkSpeedSampler::new();
        for _ in 0..7 {
            sampler.recent_samples.push_back(10.0);
            if sampler.recent_samples.len() > MAX_SPEED_SAMPLES {
                sampler.recent_samples.pop_front();
            }
        }
        assert!(sampler.recent_samples.len() <= MAX_SPEED_SAMPLES);
    }
}

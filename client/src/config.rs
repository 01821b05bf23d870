use std::env;

use crate::error::{ClientError, Result};

/// Client configuration, read from the environment the same way the
/// server's `ServerConfig::load` reads its handful of env vars directly.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub store_id: String,
    pub store_name: String,
    pub monitoring_server_url: String,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_buffer_path: String,
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        let store_id = env::var("STORE_ID")
            .map_err(|_| ClientError::Config("STORE_ID must be set".to_string()))?;
        let monitoring_server_url = env::var("MONITORING_SERVER_URL")
            .map_err(|_| ClientError::Config("MONITORING_SERVER_URL must be set".to_string()))?;

        Ok(Self {
            store_name: env::var("STORE_NAME").unwrap_or_else(|_| store_id.clone()),
            store_id,
            monitoring_server_url,
            heartbeat_interval_ms: env::var("HEARTBEAT_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60_000),
            heartbeat_buffer_path: env::var("HEARTBEAT_BUFFER_PATH")
                .unwrap_or_else(|_| "./heartbeat_buffer.db".to_string()),
        })
    }
}

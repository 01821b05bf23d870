use anyhow::Result;
use std::env;

/// Server configuration, read from the environment the way the teacher's
/// `AppConfig::load` reads its handful of env vars directly rather than
/// going through a generic config-file layer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,

    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,

    pub alert_threshold_minutes: i64,
    pub offline_alert_cooldown_minutes: i64,
    pub recovery_alert_cooldown_minutes: i64,
    pub startup_alert_cooldown_minutes: i64,
    pub health_check_interval_minutes: u64,

    pub email_config_path: String,
    pub cors_allowed_origins: Option<Vec<String>>,
}

/// Buffer added to `alert_threshold_minutes` to absorb the race between a
/// heartbeat being due and the sweeper running (`T + epsilon` in the spec).
pub const SWEEP_EPSILON_SECONDS: i64 = 30;

impl ServerConfig {
    pub fn load() -> Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/storewatch".to_string()),

            smtp_host: env::var("SMTP_HOST").ok(),
            smtp_port: env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(587),
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            smtp_from: env::var("SMTP_FROM")
                .unwrap_or_else(|_| "alerts@storewatch.local".to_string()),

            alert_threshold_minutes: env::var("ALERT_THRESHOLD_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            offline_alert_cooldown_minutes: env::var("OFFLINE_ALERT_COOLDOWN_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            recovery_alert_cooldown_minutes: env::var("RECOVERY_ALERT_COOLDOWN_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            startup_alert_cooldown_minutes: env::var("STARTUP_ALERT_COOLDOWN_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            health_check_interval_minutes: env::var("HEALTH_CHECK_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),

            email_config_path: env::var("EMAIL_CONFIG_PATH")
                .unwrap_or_else(|_| "./config/email_recipients.json".to_string()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok().map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn load_applies_defaults_when_env_unset() {
        for var in [
            "HOST",
            "PORT",
            "DATABASE_URL",
            "ALERT_THRESHOLD_MINUTES",
            "HEALTH_CHECK_INTERVAL",
        ] {
            env::remove_var(var);
        }

        let config = ServerConfig::load().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.alert_threshold_minutes, 5);
        assert_eq!(config.health_check_interval_minutes, 2);
    }

    #[test]
    #[serial]
    fn load_reads_overrides() {
        env::set_var("ALERT_THRESHOLD_MINUTES", "9");
        let config = ServerConfig::load().unwrap();
        assert_eq!(config.alert_threshold_minutes, 9);
        env::remove_var("ALERT_THRESHOLD_MINUTES");
    }
}

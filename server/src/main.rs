use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use storewatch_server::config::ServerConfig;
use storewatch_server::cooldown::CooldownTable;
use storewatch_server::database::DatabaseService;
use storewatch_server::dispatcher::AlertDispatcher;
use storewatch_server::notifier::{NotificationWorker, SmtpNotificationSink};
use storewatch_server::recipients::RecipientDirectory;
use storewatch_server::registry::LivenessRegistry;
use storewatch_server::sweeper::HealthSweeper;
use storewatch_server::{api, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::load()?;
    info!("starting storewatch server on {}:{}", config.host, config.port);

    let db = Arc::new(connect_with_backoff(&config.database_url).await?);
    db.setup_schema().await?;

    let registry = Arc::new(LivenessRegistry::new());
    let cooldown = Arc::new(CooldownTable::new());
    let recipients = Arc::new(RecipientDirectory::load(&config.email_config_path)?);

    let sink: Arc<dyn storewatch_server::notifier::NotificationSink> =
        if let Some(host) = &config.smtp_host {
            Arc::new(SmtpNotificationSink::new(
                host,
                config.smtp_port,
                config.smtp_username.as_deref(),
                config.smtp_password.as_deref(),
                &config.smtp_from,
            )?)
        } else {
            warn!("SMTP_HOST not set, notifications will be recorded but not delivered");
            Arc::new(storewatch_server::notifier::RecordingSink::new())
        };

    let (worker, notify_tx) = NotificationWorker::new(sink);
    tokio::spawn(worker.run());

    let dispatcher = Arc::new(AlertDispatcher::new(
        db.clone(),
        cooldown.clone(),
        recipients.clone(),
        notify_tx,
        config.offline_alert_cooldown_minutes,
        config.recovery_alert_cooldown_minutes,
        config.startup_alert_cooldown_minutes,
    ));

    let sweeper = Arc::new(HealthSweeper::new(
        registry.clone(),
        db.clone(),
        dispatcher.clone(),
        config.alert_threshold_minutes,
        storewatch_server::config::SWEEP_EPSILON_SECONDS,
        config.health_check_interval_minutes,
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let sweeper_clone = sweeper.clone();
    let sweeper_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        sweeper_clone.run(sweeper_shutdown).await;
    });

    let state = AppState {
        registry,
        db,
        dispatcher,
        sweeper,
        recipients,
    };

    let cors = match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let headers: Result<Vec<_>, _> = origins.iter().map(|o| o.parse()).collect();
            match headers {
                Ok(origins) => CorsLayer::new().allow_origin(origins),
                Err(_) => {
                    warn!("invalid CORS_ALLOWED_ORIGINS entry, falling back to permissive CORS");
                    CorsLayer::permissive()
                }
            }
        }
        _ => {
            warn!("CORS_ALLOWED_ORIGINS not set, falling back to permissive CORS");
            CorsLayer::permissive()
        }
    };

    let app = Router::new()
        .route("/heartbeat", post(api::ingest_live))
        .route("/heartbeat/buffered", post(api::ingest_buffered))
        .route("/dashboard", get(api::dashboard))
        .route("/store/:id", get(api::get_store))
        .route("/alerts", get(api::list_alerts))
        .route("/alerts/:id", get(api::list_alerts_for_store))
        .route("/trigger-health-check", get(api::trigger_health_check))
        .route("/test-email/:id", get(api::test_email))
        .route("/config/email", get(api::get_email_config))
        .route("/config/reload", post(api::reload_email_config))
        .route("/health", get(api::health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let shutdown_signal = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Retries the initial DB connection with exponential backoff. A
/// monitoring service with no database is of limited use, but heartbeats
/// can still be accepted into a memory-only registry while the DB comes
/// back, so this doesn't crash-loop the whole process on a brief outage.
async fn connect_with_backoff(database_url: &str) -> anyhow::Result<DatabaseService> {
    let mut attempt = 0;
    let max_attempts = 5;
    loop {
        match DatabaseService::connect(database_url).await {
            Ok(db) => return Ok(db),
            Err(err) if attempt < max_attempts => {
                attempt += 1;
                let backoff = std::time::Duration::from_secs(2u64.pow(attempt));
                error!(attempt, error = %err, "database connection failed, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

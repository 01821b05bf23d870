pub mod api;
pub mod config;
pub mod cooldown;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod notifier;
pub mod recipients;
pub mod registry;
pub mod sweeper;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<registry::LivenessRegistry>,
    pub db: Arc<database::DatabaseService>,
    pub dispatcher: Arc<dispatcher::AlertDispatcher>,
    pub sweeper: Arc<sweeper::HealthSweeper>,
    pub recipients: Arc<recipients::RecipientDirectory>,
}

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod logging;
pub mod provider;
pub mod resolver;
pub mod runner;
pub mod signature;

use axum::{Router, routing};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::dispatcher::Dispatcher;
use crate::runner::DeployRunner;

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, runner: Arc<dyn DeployRunner>) -> Self {
        Self {
            dispatcher: Dispatcher::new(settings, runner),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Routes: `GET /` health check and `POST <callback_path>` webhook.
pub fn build_router(state: SharedState) -> Router {
    let callback_path = state.dispatcher.settings().callback_path.clone();
    // Method routers on the same path are merged, so a callback path of "/" still works.
    Router::new()
        .route("/", routing::get(api::root))
        .route(&callback_path, routing::post(api::handle_webhook))
        .with_state(state)
}

//! Health check endpoint

use axum::{
    Json,
    extract::Query,
    extract::State as AxumState,
    response::IntoResponse,
};
use serde_json::json;
use std::collections::HashMap;

use crate::SharedState;

/// Root health check endpoint
/// Supports ?format=json for detailed JSON response
pub async fn root(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let format = params.get("format").map(|s| s.as_str());

    if format == Some("json") {
        let settings = state.dispatcher.settings();
        let rules: Vec<String> = settings
            .rules
            .iter()
            .map(|rule| rule.matcher.to_string())
            .collect();

        Json(json!({
            "name": "deployserver",
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "callback_path": settings.callback_path,
            "legacy_branch": settings.legacy_rule.as_ref().map(|r| r.branch_ref.clone()),
            "rules": rules,
            "status": "healthy"
        }))
        .into_response()
    } else {
        "deployserver - healthy".into_response()
    }
}

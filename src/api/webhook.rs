//! Webhook handler for GitHub and Bitbucket callbacks

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
};

use crate::SharedState;

/// Handles the webhook POST request.
///
/// The raw body is passed through untouched so the signature can be checked before
/// anything is parsed. Deploys are launched in the background; the sender always gets
/// `200 OK` unless the signature was rejected.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let outcome = state.dispatcher.handle(&headers, &body);
    (outcome.status(), outcome.body())
}

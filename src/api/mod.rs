//! HTTP handlers
//!
//! The webhook callback plus a small health endpoint

pub mod handlers;
pub mod webhook;

// Re-export handlers
pub use handlers::root;
pub use webhook::handle_webhook;

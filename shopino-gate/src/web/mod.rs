//! Web server module.
//!
//! This module provides a thin gateway that:
//! - Verifies the signature of every shop API call before anything else runs
//! - Forwards only the signed content of allowed calls to the shop backend
//! - Receives the shop's signed webhook deliveries
//!
//! ## Routes
//!
//! ```text
//! GET  /health                        open
//! GET  /wp-json/api/v1/products       signed query  → upstream
//! POST /wp-json/api/v1/order          signed body   → upstream
//! POST /wp-json/api/v1/webhook-key    signed body   → upstream
//! POST /webhooks/woocommerce          HMAC body     (only with a webhook secret)
//! ```

pub mod handlers;
pub mod middleware;
pub mod upstream;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    forward_upstream, health, woocommerce_webhook, AppState, HealthResponse, StatusResponse,
    ALLOWED_TOPICS, WEBHOOK_SIGNATURE_HEADER, WEBHOOK_TOPIC_HEADER,
};
pub use middleware::require_signature;
pub use upstream::{Upstream, UpstreamResponse};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/wp-json/api/v1/products", get(forward_upstream))
        .route("/wp-json/api/v1/order", post(forward_upstream))
        .route("/wp-json/api/v1/webhook-key", post(forward_upstream))
        .route_layer(from_fn_with_state(state.clone(), require_signature));

    let mut app = Router::new().route("/health", get(health)).merge(protected);

    if state.webhook_gate.is_some() {
        app = app.route("/webhooks/woocommerce", post(woocommerce_webhook));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

//! Endpoint handlers.
//!
//! Protected shop routes carry no logic of their own: the signature
//! middleware has already allowed them, so they only forward to the upstream.
//! The webhook receiver verifies the shop's own HMAC signature inline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Bytes},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::auth::{AuthError, Decision, Gate, SignedRequest};
use crate::web::middleware::{signature_header, unauthorized};
use crate::web::upstream::Upstream;
use crate::Config;

/// Header the shop signs webhook deliveries with.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-WC-Webhook-Signature";

/// Header naming the webhook topic.
pub const WEBHOOK_TOPIC_HEADER: &str = "X-WC-Webhook-Topic";

/// Webhook topics accepted by the receiver.
pub const ALLOWED_TOPICS: &[&str] = &[
    "order.created",
    "order.updated",
    "order.deleted",
    "product.created",
    "product.updated",
    "product.deleted",
    "customer.created",
    "customer.updated",
    "customer.deleted",
];

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gate: Gate,
    pub webhook_gate: Option<Gate>,
    pub upstream: Upstream,
}

impl AppState {
    /// Build state from configuration.
    ///
    /// Fails when the credential cannot be loaded; the server must not start
    /// serving authenticated routes in that case.
    pub fn new(config: Config) -> Result<Self> {
        let credential = config
            .credential()
            .context("Request credential unavailable")?;

        let mut gate = Gate::new(credential);
        if let Some(max_age) = config.signature_max_age {
            gate = gate.with_max_age(max_age);
        }

        let webhook_gate = config
            .webhook_credential()
            .transpose()
            .context("Webhook credential unavailable")?
            .map(Gate::new);

        let upstream = Upstream::new(
            &config.upstream_url,
            Duration::from_millis(config.upstream_timeout_ms),
        )?;

        Ok(Self {
            config: Arc::new(config),
            gate,
            webhook_gate,
            upstream,
        })
    }
}

// =============================================================================
// Responses
// =============================================================================

/// JSON status body shared by gate, proxy and webhook responses.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn status(status: &'static str) -> Self {
        Self {
            status,
            reason: None,
            message: None,
        }
    }

    pub fn denied(reason: AuthError) -> Self {
        Self {
            status: "unauthorized",
            reason: Some(reason.code()),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Protected Shop Routes
// =============================================================================

/// Forward an already-authenticated request to the shop backend.
///
/// The signature middleware has reduced the request to its signed content,
/// so the URI and body here are exactly what was verified.
pub async fn forward_upstream(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, state.config.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "request_body_read_failed");
            return (
                StatusCode::BAD_REQUEST,
                Json(StatusResponse::status("invalid_body")),
            )
                .into_response();
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");

    let result = state
        .upstream
        .forward(
            parts.method,
            path_and_query,
            parts.headers.get(CONTENT_TYPE).cloned(),
            body,
        )
        .await;

    match result {
        Ok(upstream) => {
            let mut response = (upstream.status, upstream.body).into_response();
            if let Some(content_type) = upstream.content_type {
                response.headers_mut().insert(CONTENT_TYPE, content_type);
            }
            response
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), path = %parts.uri.path(), "upstream_forward_failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(StatusResponse::status("upstream_error")),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Shop Webhook Receiver
// =============================================================================

/// Inbound shop webhook endpoint.
///
/// This endpoint:
/// 1. Verifies the HMAC signature over the raw body
/// 2. Acknowledges delivery pings (bodies carrying `webhook_id`)
/// 3. Accepts deliveries for allowed topics only
pub async fn woocommerce_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(gate) = &state.webhook_gate else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let topic = headers
        .get(WEBHOOK_TOPIC_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    info!(
        topic = ?topic,
        body_length = body.len(),
        has_signature = headers.contains_key(WEBHOOK_SIGNATURE_HEADER),
        "webhook_received"
    );

    let signed = SignedRequest::from_parts(
        Method::POST,
        None,
        body.clone(),
        signature_header(&headers, WEBHOOK_SIGNATURE_HEADER),
    );
    if let Decision::Deny(reason) = gate.evaluate(&signed) {
        warn!(
            method = "POST",
            path = "/webhooks/woocommerce",
            reason = reason.code(),
            "request_denied"
        );
        return unauthorized(reason).into_response();
    }

    let Some(payload) = parse_webhook_body(&headers, &body) else {
        warn!(topic = ?topic, "webhook_payload_invalid");
        return (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse::status("invalid_payload")),
        )
            .into_response();
    };

    if let Some(webhook_id) = field_as_string(&payload, "webhook_id") {
        info!(webhook_id = %webhook_id, "webhook_ping_acknowledged");
        return (
            StatusCode::OK,
            Json(
                StatusResponse::status("success")
                    .with_message(format!("webhook {} initialized", webhook_id)),
            ),
        )
            .into_response();
    }

    let topic = match topic {
        Some(topic) if ALLOWED_TOPICS.contains(&topic.as_str()) => topic,
        other => {
            warn!(topic = ?other, "webhook_topic_rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(StatusResponse::status("invalid_topic")),
            )
                .into_response();
        }
    };

    info!(
        topic = %topic,
        resource_id = ?field_as_string(&payload, "id"),
        "webhook_accepted"
    );

    (
        StatusCode::OK,
        Json(StatusResponse::status("success").with_message(format!("webhook {} processed", topic))),
    )
        .into_response()
}

/// Parse a webhook body as form data or JSON, depending on content type.
fn parse_webhook_body(headers: &HeaderMap, body: &[u8]) -> Option<serde_json::Value> {
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        let map: serde_json::Map<String, serde_json::Value> = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), serde_json::Value::String(v.into_owned())))
            .collect();
        return Some(serde_json::Value::Object(map));
    }

    serde_json::from_slice(body).ok()
}

/// Read a string or numeric field as text.
fn field_as_string(payload: &serde_json::Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serde_json::json;

    use super::*;

    fn form_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers
    }

    #[test]
    fn test_parse_webhook_body_form() {
        let payload = parse_webhook_body(&form_headers(), b"webhook_id=42").unwrap();
        assert_eq!(field_as_string(&payload, "webhook_id"), Some("42".to_string()));
    }

    #[test]
    fn test_parse_webhook_body_json() {
        let payload = parse_webhook_body(&HeaderMap::new(), br#"{"id": 17, "status": "processing"}"#)
            .unwrap();
        assert_eq!(field_as_string(&payload, "id"), Some("17".to_string()));
        assert_eq!(field_as_string(&payload, "webhook_id"), None);
    }

    #[test]
    fn test_parse_webhook_body_invalid_json() {
        assert!(parse_webhook_body(&HeaderMap::new(), b"{not json").is_none());
    }

    #[test]
    fn test_field_as_string_ignores_empty_and_objects() {
        let payload = json!({"a": "", "b": {"nested": 1}, "c": null});
        assert_eq!(field_as_string(&payload, "a"), None);
        assert_eq!(field_as_string(&payload, "b"), None);
        assert_eq!(field_as_string(&payload, "c"), None);
    }

    #[test]
    fn test_status_response_serialization() {
        let body = serde_json::to_value(StatusResponse::denied(AuthError::EmptyPayload)).unwrap();
        assert_eq!(body, json!({"status": "unauthorized", "reason": "empty_payload"}));

        let body = serde_json::to_value(StatusResponse::status("success").with_message("ok")).unwrap();
        assert_eq!(body, json!({"status": "success", "message": "ok"}));
    }
}

//! Signature gate as axum middleware.
//!
//! Runs before every protected handler:
//! 1. Buffer the body (bounded)
//! 2. Refuse query content a signature cannot cover
//! 3. Evaluate the gate over method, query, body and signature header
//! 4. Deny with 401 and a reason code, or pass on only the signed content

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{request::Parts, uri::InvalidUri, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use http_body_util::LengthLimitError;
use tracing::warn;

use crate::auth::{canonical_query, duplicate_query_key, AuthError, Decision, SignedRequest};
use crate::web::handlers::{AppState, StatusResponse};

/// Reject any request whose signature does not verify.
pub async fn require_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, state.config.max_body_bytes).await {
        Ok(body) => body,
        Err(e) if is_length_limit(&e) => {
            warn!(
                path = %parts.uri.path(),
                max_body_bytes = state.config.max_body_bytes,
                "request_body_too_large"
            );
            return status_response(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large");
        }
        Err(e) => {
            warn!(path = %parts.uri.path(), error = %e, "request_body_unreadable");
            return status_response(StatusCode::BAD_REQUEST, "invalid_body");
        }
    };

    if let Some(status) = unsigned_query(&parts.method, parts.uri.query()) {
        warn!(
            method = %parts.method,
            path = %parts.uri.path(),
            status,
            "request_rejected"
        );
        return status_response(StatusCode::BAD_REQUEST, status);
    }

    let signed = SignedRequest::from_parts(
        parts.method.clone(),
        parts.uri.query(),
        body,
        signature_header(&parts.headers, &state.config.signature_header),
    );

    match state.gate.evaluate(&signed) {
        Decision::Allow => match signed_content(parts, signed) {
            Ok(request) => next.run(request).await,
            Err(e) => {
                warn!(error = %e, "canonical_uri_invalid");
                status_response(StatusCode::BAD_REQUEST, "invalid_query")
            }
        },
        Decision::Deny(reason) => {
            warn!(
                method = %parts.method,
                path = %parts.uri.path(),
                reason = reason.code(),
                "request_denied"
            );
            unauthorized(reason).into_response()
        }
    }
}

/// Whether a body read failed on the size limit rather than the stream.
fn is_length_limit(error: &axum::Error) -> bool {
    std::error::Error::source(error).is_some_and(|source| source.is::<LengthLimitError>())
}

/// Status for query content that no signature covers, if any.
///
/// Writes sign only their body, so they may not carry a query. Reads sign a
/// key/value map, so a repeated key has values outside the signature.
fn unsigned_query(method: &Method, raw_query: Option<&str>) -> Option<&'static str> {
    let raw_query = raw_query.filter(|q| !q.is_empty())?;

    if method != Method::GET {
        return Some("unsigned_query");
    }

    duplicate_query_key(raw_query).map(|_| "duplicate_query_parameter")
}

/// Rebuild an allowed request from what its signature covered: the canonical
/// query for reads and the raw body for writes.
fn signed_content(mut parts: Parts, signed: SignedRequest) -> Result<Request, InvalidUri> {
    if signed.method != Method::GET {
        return Ok(Request::from_parts(parts, Body::from(signed.body)));
    }

    let query = canonical_query(&signed.query).unwrap_or_default();
    parts.uri = format!("{}?{}", parts.uri.path(), query).parse()?;
    Ok(Request::from_parts(parts, Body::empty()))
}

fn status_response(status: StatusCode, code: &'static str) -> Response {
    (status, Json(StatusResponse::status(code))).into_response()
}

/// Read a signature header as text.
///
/// Non-UTF-8 bytes are kept (lossily) so they fail as malformed rather than
/// looking absent.
pub fn signature_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

/// 401 body carrying the deny reason code.
pub fn unauthorized(reason: AuthError) -> (StatusCode, Json<StatusResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(StatusResponse::denied(reason)),
    )
}

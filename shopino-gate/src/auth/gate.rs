//! The single allow/deny decision point in front of protected routes.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::Method;
use tracing::debug;

use super::canonical::{canonicalize, SignedRequest};
use super::credential::Credential;
use super::error::AuthError;
use super::verify::verify;

/// Query parameter carrying the signer's unix time.
pub const TIMESTAMP_PARAM: &str = "timestamp";

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(AuthError),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Request gate bound to one immutable credential.
///
/// Cloning is cheap; all clones share the credential.
#[derive(Debug, Clone)]
pub struct Gate {
    credential: Arc<Credential>,
    max_age_seconds: Option<u64>,
}

impl Gate {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential: Arc::new(credential),
            max_age_seconds: None,
        }
    }

    /// Require signed GETs to carry a `timestamp` no older than `seconds`.
    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age_seconds = Some(seconds);
        self
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Decide whether `request` may reach downstream handlers.
    ///
    /// Callers log `request_denied` together with the request path.
    pub fn evaluate(&self, request: &SignedRequest) -> Decision {
        match self.check(request) {
            Ok(()) => {
                debug!(method = %request.method, "request_allowed");
                Decision::Allow
            }
            Err(reason) => {
                debug!(
                    method = %request.method,
                    reason = reason.code(),
                    algorithm = self.credential.algorithm(),
                    "signature_rejected"
                );
                Decision::Deny(reason)
            }
        }
    }

    fn check(&self, request: &SignedRequest) -> Result<(), AuthError> {
        let signature = request
            .signature
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(AuthError::MissingSignature)?;

        let payload = canonicalize(request)?;

        if !verify(&payload, signature, &self.credential)? {
            return Err(AuthError::VerificationFailed);
        }

        if let Some(max_age) = self.max_age_seconds {
            if request.method == Method::GET {
                let timestamp = request.query.get(TIMESTAMP_PARAM).map(String::as_str);
                if !is_fresh(timestamp, max_age, unix_now()) {
                    return Err(AuthError::StaleRequest);
                }
            }
        }

        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Whether `timestamp` parses and lies within `max_age` seconds of `now`,
/// in either direction to tolerate clock skew.
fn is_fresh(timestamp: Option<&str>, max_age: u64, now: u64) -> bool {
    let Some(sent) = timestamp.and_then(|t| t.trim().parse::<u64>().ok()) else {
        return false;
    };
    now.abs_diff(sent) <= max_age
}

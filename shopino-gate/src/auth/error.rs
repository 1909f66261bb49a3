//! Authentication error types.
//!
//! Per-request failures ([`AuthError`]) always resolve to a deny decision and
//! carry a stable reason code for diagnostics. Credential failures
//! ([`CredentialError`]) happen once at startup and are fatal.

use thiserror::Error;

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No signature header on the request.
    #[error("signature header is missing")]
    MissingSignature,

    /// Nothing to verify: no query parameters on a GET, or an empty body.
    #[error("request has no content to verify")]
    EmptyPayload,

    /// Signature is not base64, or not a structurally valid signature for the
    /// configured algorithm.
    #[error("signature is malformed")]
    MalformedSignature,

    /// Well-formed signature that does not match the payload.
    #[error("signature verification failed")]
    VerificationFailed,

    /// Signature is valid but the request timestamp is outside the replay window.
    #[error("request timestamp is missing or outside the allowed window")]
    StaleRequest,
}

impl AuthError {
    /// Stable, secret-free reason code for logs and response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingSignature => "missing_signature",
            AuthError::EmptyPayload => "empty_payload",
            AuthError::MalformedSignature => "malformed_signature",
            AuthError::VerificationFailed => "verification_failed",
            AuthError::StaleRequest => "stale_request",
        }
    }
}

/// Configured credential material is missing or cannot be parsed.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("auth mode '{0}' is not one of 'symmetric' or 'asymmetric'")]
    UnknownMode(String),

    #[error("no shared secret configured for symmetric mode")]
    MissingSecret,

    #[error("no public key configured for asymmetric mode")]
    MissingPublicKey,

    #[error("failed to read key file {path}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("key is not a supported RSA or P-256 PEM key")]
    UnsupportedKey,
}

/// Generating or encoding a new key pair failed.
#[derive(Debug, Error)]
pub enum KeyGenError {
    #[error("RSA key generation failed: {0}")]
    Generate(#[from] rsa::Error),

    #[error("private key encoding failed: {0}")]
    EncodePrivate(#[from] rsa::pkcs8::Error),

    #[error("public key encoding failed: {0}")]
    EncodePublic(#[from] rsa::pkcs8::spki::Error),
}

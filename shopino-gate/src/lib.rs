//! Shopino Gate - signature-verifying gateway for the Shopino shop API.
//!
//! This library provides the modules for the two Shopino binaries:
//! - `shopino-gate`: Web server that authenticates shop API calls
//! - `shopino-sign`: Command-line signer for building authenticated requests
//!
//! ## Architecture
//!
//! ```text
//! Client ──signed request──→ Gate (canonicalize → verify) ──allowed──→ Shop backend
//!                                      │
//!                                      └──denied──→ 401 + reason code
//! ```

pub mod auth;
pub mod config;
pub mod web;

// Re-export commonly used types
pub use auth::{
    canonicalize, sign_symmetric, verify, AuthError, CanonicalPayload, Credential,
    CredentialError, Decision, Gate, SignedRequest, SigningKey,
};
pub use config::Config;
pub use web::{router, AppState};

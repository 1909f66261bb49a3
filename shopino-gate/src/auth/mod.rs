//! Request-signature authentication.
//!
//! ## Flow
//!
//! ```text
//! SignedRequest → canonicalize() → CanonicalPayload → verify() → Gate decision
//! ```
//!
//! Reads (GET) sign their sorted, form-encoded query string. Writes sign the
//! raw body. The credential is either a shared HMAC-SHA256 secret or an RSA /
//! P-256 public key, fixed for the life of the process.

pub mod canonical;
pub mod credential;
pub mod error;
pub mod gate;
pub mod sign;
pub mod verify;

pub use canonical::{canonical_query, canonicalize, duplicate_query_key, CanonicalPayload, SignedRequest};
pub use credential::{Credential, PublicKey};
pub use error::{AuthError, CredentialError, KeyGenError};
pub use gate::{Decision, Gate, TIMESTAMP_PARAM};
pub use sign::{generate_rsa_key_pair, sign_symmetric, RsaKeyPair, SigningKey, RSA_KEY_BITS};
pub use verify::verify;

//! Verification credentials.
//!
//! A deployment runs with exactly one credential: a shared HMAC secret or a
//! public key. Credentials are loaded once at startup and shared read-only.

use std::fmt;

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;

use super::error::CredentialError;

/// Key material used to verify request signatures.
#[derive(Clone)]
pub enum Credential {
    /// HMAC-SHA256 shared secret.
    Shared(SharedSecret),
    /// RSA or ECDSA public key.
    Public(PublicKey),
}

impl Credential {
    /// Shared-secret credential. An empty secret is rejected.
    pub fn shared(secret: impl Into<Vec<u8>>) -> Result<Self, CredentialError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(CredentialError::MissingSecret);
        }
        Ok(Credential::Shared(SharedSecret(secret)))
    }

    /// Public-key credential from PEM text.
    pub fn public_key_pem(pem: &str) -> Result<Self, CredentialError> {
        PublicKey::from_pem(pem).map(Credential::Public)
    }

    /// Short algorithm label, safe to log.
    pub fn algorithm(&self) -> &'static str {
        match self {
            Credential::Shared(_) => "hmac-sha256",
            Credential::Public(PublicKey::Rsa(_)) => "rsa-pkcs1v15-sha256",
            Credential::Public(PublicKey::EcdsaP256(_)) => "ecdsa-p256-sha256",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.algorithm()).finish()
    }
}

/// Opaque shared secret. Never printed.
#[derive(Clone)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub(crate) fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Asymmetric verification key.
#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(p256::ecdsa::VerifyingKey),
}

impl PublicKey {
    /// Parse a PEM public key.
    ///
    /// Accepts SPKI (`BEGIN PUBLIC KEY`) for RSA and P-256, and PKCS#1
    /// (`BEGIN RSA PUBLIC KEY`) for RSA.
    pub fn from_pem(pem: &str) -> Result<Self, CredentialError> {
        let pem = pem.trim();

        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(PublicKey::Rsa(key));
        }
        if let Ok(key) = RsaPublicKey::from_pkcs1_pem(pem) {
            return Ok(PublicKey::Rsa(key));
        }
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            return Ok(PublicKey::EcdsaP256(key));
        }

        Err(CredentialError::UnsupportedKey)
    }
}

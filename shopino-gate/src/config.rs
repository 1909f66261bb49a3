//! Configuration module for environment variable parsing.
//!
//! Credential material is read once here and turned into an immutable
//! [`Credential`] at startup. Nothing else in the crate reads the environment.

use std::env;
use std::fmt;
use std::fs;

use tracing::warn;

use crate::auth::{Credential, CredentialError};

/// Default header carrying the request signature.
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Shopino-Signature";

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// `symmetric` (shared secret) or `asymmetric` (public key)
    pub auth_mode: String,

    /// Shared secret for symmetric mode
    pub shared_secret: Option<String>,

    /// PEM public key text for asymmetric mode
    pub public_key_pem: Option<String>,

    /// Path to a PEM public key, used when `public_key_pem` is unset
    pub public_key_path: Option<String>,

    /// Header carrying the base64 signature
    pub signature_header: String,

    /// Replay window for signed GETs, in seconds. Disabled when unset.
    pub signature_max_age: Option<u64>,

    /// Base URL of the shop backend that allowed requests are forwarded to
    pub upstream_url: String,

    /// Upstream request timeout in milliseconds
    pub upstream_timeout_ms: u64,

    /// Largest request body the gate will buffer for verification
    pub max_body_bytes: usize,

    /// Secret the shop signs outgoing webhook deliveries with
    pub webhook_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Config {
            port: parse_or(&lookup, "PORT", 8080),

            auth_mode: non_empty("SHOPINO_AUTH_MODE").unwrap_or_else(|| "asymmetric".to_string()),

            shared_secret: non_empty("SHOPINO_SHARED_SECRET"),

            public_key_pem: non_empty("SHOPINO_PUBLIC_KEY_PEM"),

            public_key_path: non_empty("SHOPINO_PUBLIC_KEY_PATH"),

            signature_header: non_empty("SHOPINO_SIGNATURE_HEADER")
                .unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.to_string()),

            signature_max_age: non_empty("SHOPINO_SIGNATURE_MAX_AGE").and_then(|raw| {
                match raw.trim().parse() {
                    Ok(seconds) => Some(seconds),
                    Err(_) => {
                        warn!(env_var = "SHOPINO_SIGNATURE_MAX_AGE", value = %raw, "Invalid value, replay window disabled");
                        None
                    }
                }
            }),

            upstream_url: non_empty("SHOPINO_UPSTREAM_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),

            upstream_timeout_ms: parse_or(&lookup, "SHOPINO_UPSTREAM_TIMEOUT_MS", 10_000),

            max_body_bytes: parse_or(&lookup, "SHOPINO_MAX_BODY_BYTES", 1024 * 1024),

            webhook_secret: non_empty("WOOCOMMERCE_WEBHOOK_SECRET"),
        }
    }

    /// Build the request-verification credential for the configured mode.
    ///
    /// Fails when the mode is unknown or its key material is missing or
    /// unparsable. Callers treat this as fatal.
    pub fn credential(&self) -> Result<Credential, CredentialError> {
        match self.auth_mode.trim().to_ascii_lowercase().as_str() {
            "symmetric" | "hmac" => {
                let secret = self
                    .shared_secret
                    .as_deref()
                    .ok_or(CredentialError::MissingSecret)?;
                Credential::shared(secret)
            }
            "asymmetric" | "public-key" => {
                let pem = match (&self.public_key_pem, &self.public_key_path) {
                    (Some(pem), _) => unescape_newlines(pem),
                    (None, Some(path)) => {
                        fs::read_to_string(path).map_err(|source| CredentialError::KeyFile {
                            path: path.clone(),
                            source,
                        })?
                    }
                    (None, None) => return Err(CredentialError::MissingPublicKey),
                };
                Credential::public_key_pem(&pem)
            }
            other => Err(CredentialError::UnknownMode(other.to_string())),
        }
    }

    /// Credential for inbound shop webhooks, if a webhook secret is configured.
    pub fn webhook_credential(&self) -> Option<Result<Credential, CredentialError>> {
        self.webhook_secret.as_deref().map(Credential::shared)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("auth_mode", &self.auth_mode)
            .field("shared_secret_set", &self.shared_secret.is_some())
            .field("public_key_pem_set", &self.public_key_pem.is_some())
            .field("public_key_path", &self.public_key_path)
            .field("signature_header", &self.signature_header)
            .field("signature_max_age", &self.signature_max_age)
            .field("upstream_url", &self.upstream_url)
            .field("upstream_timeout_ms", &self.upstream_timeout_ms)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("webhook_secret_set", &self.webhook_secret.is_some())
            .finish()
    }
}

/// Parse a numeric variable, falling back to `default` when unset or invalid.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(env_var = name, value = %raw, "Invalid number, using default");
            default
        }),
    }
}

/// PEM text pasted into a single-line variable usually arrives with literal `\n`.
fn unescape_newlines(pem: &str) -> String {
    if pem.contains('\n') {
        pem.to_string()
    } else {
        pem.replace("\\n", "\n")
    }
}

/// Lookup over a fixed map.
#[cfg(test)]
pub(crate) fn lookup_from(
    vars: std::collections::HashMap<String, String>,
) -> impl Fn(&str) -> Option<String> {
    move |name| vars.get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(lookup_from(vars))
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.auth_mode, "asymmetric");
        assert_eq!(config.signature_header, DEFAULT_SIGNATURE_HEADER);
        assert_eq!(config.signature_max_age, None);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config(&[("PORT", "eighty"), ("SHOPINO_SIGNATURE_MAX_AGE", "soon")]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.signature_max_age, None);
    }

    #[test]
    fn test_symmetric_credential() {
        let config = config(&[
            ("SHOPINO_AUTH_MODE", "symmetric"),
            ("SHOPINO_SHARED_SECRET", "s3cret"),
        ]);
        assert_eq!(config.credential().unwrap().algorithm(), "hmac-sha256");
    }

    #[test]
    fn test_symmetric_without_secret_is_unavailable() {
        let config = config(&[
            ("SHOPINO_AUTH_MODE", "symmetric"),
            ("SHOPINO_SHARED_SECRET", "  "),
        ]);
        assert!(matches!(
            config.credential(),
            Err(CredentialError::MissingSecret)
        ));
    }

    #[test]
    fn test_asymmetric_without_key_is_unavailable() {
        assert!(matches!(
            config(&[]).credential(),
            Err(CredentialError::MissingPublicKey)
        ));
    }

    #[test]
    fn test_asymmetric_missing_key_file() {
        let config = config(&[("SHOPINO_PUBLIC_KEY_PATH", "/nonexistent/public.pem")]);
        assert!(matches!(
            config.credential(),
            Err(CredentialError::KeyFile { .. })
        ));
    }

    #[test]
    fn test_asymmetric_escaped_pem() {
        use rsa::pkcs8::{EncodePublicKey, LineEnding};

        let private = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
            .replace('\n', "\\n");

        let config = config(&[("SHOPINO_PUBLIC_KEY_PEM", pem.as_str())]);
        assert_eq!(config.credential().unwrap().algorithm(), "rsa-pkcs1v15-sha256");
    }

    #[test]
    fn test_unknown_mode() {
        let config = config(&[("SHOPINO_AUTH_MODE", "static-key")]);
        assert!(matches!(
            config.credential(),
            Err(CredentialError::UnknownMode(mode)) if mode == "static-key"
        ));
    }

    #[test]
    fn test_webhook_credential() {
        assert!(config(&[]).webhook_credential().is_none());

        let config = config(&[("WOOCOMMERCE_WEBHOOK_SECRET", "local_host")]);
        assert!(matches!(config.webhook_credential(), Some(Ok(_))));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = config(&[
            ("SHOPINO_SHARED_SECRET", "hunter2"),
            ("WOOCOMMERCE_WEBHOOK_SECRET", "wc-secret"),
        ]);
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("wc-secret"));
        assert!(printed.contains("shared_secret_set: true"));
    }
}

//! Signature verification.
//!
//! `Ok(false)` means the signature is well-formed but does not match.
//! `Err(MalformedSignature)` means it could never have matched: not base64,
//! or not a valid encoding for the configured algorithm.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::Mac;
use p256::ecdsa::signature::Verifier;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use super::canonical::CanonicalPayload;
use super::credential::{Credential, PublicKey};
use super::error::AuthError;
use super::sign::keyed_mac;

/// Check a base64 signature against a canonical payload.
pub fn verify(
    payload: &CanonicalPayload,
    signature: &str,
    credential: &Credential,
) -> Result<bool, AuthError> {
    let signature = BASE64
        .decode(signature.trim())
        .map_err(|_| AuthError::MalformedSignature)?;

    let valid = match credential {
        Credential::Shared(secret) => {
            verify_hmac(secret.expose(), payload.as_bytes(), &signature)
        }
        Credential::Public(PublicKey::Rsa(key)) => {
            verify_rsa(key, payload.as_bytes(), &signature)?
        }
        Credential::Public(PublicKey::EcdsaP256(key)) => {
            verify_ecdsa(key, payload.as_bytes(), &signature)?
        }
    };

    if !valid {
        debug!(
            algorithm = credential.algorithm(),
            signature_length = signature.len(),
            "signature_mismatch"
        );
    }

    Ok(valid)
}

fn verify_hmac(secret: &[u8], payload: &[u8], signature: &[u8]) -> bool {
    let mut mac = keyed_mac(secret);
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    constant_time_compare(&expected, signature)
}

fn verify_rsa(key: &RsaPublicKey, payload: &[u8], signature: &[u8]) -> Result<bool, AuthError> {
    if signature.len() != key.size() {
        return Err(AuthError::MalformedSignature);
    }

    let hashed = Sha256::digest(payload);
    Ok(key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature)
        .is_ok())
}

fn verify_ecdsa(
    key: &p256::ecdsa::VerifyingKey,
    payload: &[u8],
    signature: &[u8],
) -> Result<bool, AuthError> {
    let signature = p256::ecdsa::Signature::from_der(signature)
        .or_else(|_| p256::ecdsa::Signature::from_slice(signature))
        .map_err(|_| AuthError::MalformedSignature)?;

    Ok(key.verify(payload, &signature).is_ok())
}

/// Constant-time byte comparison. Lengths are not secret.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::OnceLock;

    use axum::body::Bytes;
    use axum::http::Method;

    use super::*;
    use crate::auth::canonical::{canonicalize, SignedRequest};
    use crate::auth::sign::{sign_symmetric, SigningKey};

    const SECRET: &[u8] = b"test-shared-secret";

    fn payload(bytes: &'static [u8]) -> CanonicalPayload {
        canonicalize(&SignedRequest {
            method: Method::POST,
            query: HashMap::new(),
            body: Bytes::from_static(bytes),
            signature: None,
        })
        .unwrap()
    }

    fn rsa_key() -> &'static SigningKey {
        static KEY: OnceLock<SigningKey> = OnceLock::new();
        KEY.get_or_init(|| {
            SigningKey::Rsa(rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
        })
    }

    fn ecdsa_key() -> SigningKey {
        SigningKey::EcdsaP256(p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng))
    }

    #[test]
    fn test_symmetric_round_trip() {
        let body = payload(br#"{"billing":{"first_name":"John"}}"#);
        let credential = Credential::shared(SECRET).unwrap();
        let signature = sign_symmetric(body.as_bytes(), SECRET);

        assert_eq!(verify(&body, &signature, &credential), Ok(true));
    }

    #[test]
    fn test_symmetric_wrong_secret() {
        let body = payload(b"page=2&per_page=10");
        let signature = sign_symmetric(body.as_bytes(), SECRET);
        let other = Credential::shared("another-secret").unwrap();

        assert_eq!(verify(&body, &signature, &other), Ok(false));
    }

    #[test]
    fn test_symmetric_tamper_any_byte() {
        let original: &'static [u8] = br#"{"secret":"local_host"}"#;
        let credential = Credential::shared(SECRET).unwrap();
        let signature = sign_symmetric(original, SECRET);

        for i in 0..original.len() {
            let mut tampered = original.to_vec();
            tampered[i] ^= 0x01;
            let tampered = canonicalize(&SignedRequest {
                method: Method::POST,
                query: HashMap::new(),
                body: Bytes::from(tampered),
                signature: None,
            })
            .unwrap();
            assert_eq!(verify(&tampered, &signature, &credential), Ok(false), "byte {i}");
        }
    }

    #[test]
    fn test_symmetric_short_signature_is_mismatch() {
        let body = payload(b"hello");
        let credential = Credential::shared(SECRET).unwrap();

        assert_eq!(verify(&body, "AAAA", &credential), Ok(false));
    }

    #[test]
    fn test_non_base64_is_malformed() {
        let body = payload(b"hello");
        let credential = Credential::shared(SECRET).unwrap();

        assert_eq!(
            verify(&body, "not base64!!", &credential),
            Err(AuthError::MalformedSignature)
        );
    }

    #[test]
    fn test_signature_whitespace_is_trimmed() {
        let body = payload(b"hello");
        let credential = Credential::shared(SECRET).unwrap();
        let signature = format!("  {}\n", sign_symmetric(b"hello", SECRET));

        assert_eq!(verify(&body, &signature, &credential), Ok(true));
    }

    #[test]
    fn test_rsa_round_trip_and_tamper() {
        let key = rsa_key();
        let credential = key.credential().unwrap();
        let signature = key.sign(b"page=1&per_page=10&timestamp=1700000000").unwrap();

        assert_eq!(
            verify(&payload(b"page=1&per_page=10&timestamp=1700000000"), &signature, &credential),
            Ok(true)
        );
        assert_eq!(
            verify(&payload(b"page=1&per_page=10&timestamp=1700000001"), &signature, &credential),
            Ok(false)
        );
    }

    #[test]
    fn test_rsa_wrong_length_is_malformed() {
        let credential = rsa_key().credential().unwrap();
        let short = BASE64.encode([0u8; 16]);

        assert_eq!(
            verify(&payload(b"hello"), &short, &credential),
            Err(AuthError::MalformedSignature)
        );
    }

    #[test]
    fn test_rsa_garbage_of_right_length_is_mismatch() {
        let credential = rsa_key().credential().unwrap();
        let garbage = BASE64.encode([0x5au8; 128]);

        assert_eq!(verify(&payload(b"hello"), &garbage, &credential), Ok(false));
    }

    #[test]
    fn test_ecdsa_round_trip_der_and_fixed() {
        let key = ecdsa_key();
        let credential = key.credential().unwrap();

        let der = key.sign(b"order-body").unwrap();
        assert_eq!(verify(&payload(b"order-body"), &der, &credential), Ok(true));
        assert_eq!(verify(&payload(b"order-bodY"), &der, &credential), Ok(false));

        let SigningKey::EcdsaP256(inner) = &key else {
            panic!("expected ecdsa key");
        };
        let fixed: p256::ecdsa::Signature = p256::ecdsa::signature::Signer::sign(inner, b"order-body");
        let fixed = BASE64.encode(fixed.to_bytes());
        assert_eq!(verify(&payload(b"order-body"), &fixed, &credential), Ok(true));
    }

    #[test]
    fn test_ecdsa_unparsable_is_malformed() {
        let credential = ecdsa_key().credential().unwrap();
        let junk = BASE64.encode([1u8; 10]);

        assert_eq!(
            verify(&payload(b"hello"), &junk, &credential),
            Err(AuthError::MalformedSignature)
        );
    }

    #[test]
    fn test_mixed_mode_never_verifies() {
        // An HMAC signature checked against a public key is just wrong bytes.
        let credential = rsa_key().credential().unwrap();
        let signature = sign_symmetric(b"hello", SECRET);

        assert!(!matches!(verify(&payload(b"hello"), &signature, &credential), Ok(true)));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abc", b"abc"));
        assert!(!constant_time_compare(b"abc", b"abd"));
        assert!(!constant_time_compare(b"abc", b"abcd"));
    }
}

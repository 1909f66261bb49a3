//! Request canonicalization.
//!
//! Reads sign their query parameters, writes sign their raw body:
//!
//! ```text
//! GET  /products?per_page=10&page=2  ->  page=2&per_page=10
//! POST /order  {"billing":...}       ->  {"billing":...}
//! ```

use std::collections::{HashMap, HashSet};

use axum::body::Bytes;
use axum::http::Method;
use url::form_urlencoded;

use super::error::AuthError;

/// The authenticated content of one inbound request.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: Method,
    pub query: HashMap<String, String>,
    pub body: Bytes,
    /// Base64 signature text from the signature header, if present.
    pub signature: Option<String>,
}

impl SignedRequest {
    /// Build a request from a raw query string (without the leading `?`).
    ///
    /// Duplicate keys keep the last value.
    pub fn from_parts(
        method: Method,
        raw_query: Option<&str>,
        body: Bytes,
        signature: Option<String>,
    ) -> Self {
        let query = raw_query
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        Self {
            method,
            query,
            body,
            signature,
        }
    }
}

/// Deterministic byte form of a request's authenticated content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPayload(Bytes);

impl CanonicalPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for CanonicalPayload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Produce the canonical payload for a request.
pub fn canonicalize(request: &SignedRequest) -> Result<CanonicalPayload, AuthError> {
    if request.method == Method::GET {
        let query = canonical_query(&request.query).ok_or(AuthError::EmptyPayload)?;
        return Ok(CanonicalPayload(Bytes::from(query)));
    }

    if request.body.is_empty() {
        return Err(AuthError::EmptyPayload);
    }

    // Bytes clones share the buffer.
    Ok(CanonicalPayload(request.body.clone()))
}

/// First key that occurs more than once in a raw query string.
pub fn duplicate_query_key(raw_query: &str) -> Option<String> {
    let mut seen = HashSet::new();
    form_urlencoded::parse(raw_query.as_bytes())
        .map(|(key, _)| key)
        .find(|key| !seen.insert(key.clone()))
        .map(|key| key.into_owned())
}

/// Sort parameters by key and form-encode them. `None` when there are none.
pub fn canonical_query<K, V>(params: &HashMap<K, V>) -> Option<String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if params.is_empty() {
        return None;
    }

    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .collect();
    pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));

    Some(
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish(),
    )
}

//! Shopino Sign - produce signatures for shop API calls.
//!
//! ```text
//! shopino-sign get page=2 per_page=10 timestamp=1700000000
//! shopino-sign post < order.json
//! shopino-sign keygen ./keys
//! ```
//!
//! Key material comes from `SHOPINO_PRIVATE_KEY_PATH` (PEM, RSA or P-256) or
//! `SHOPINO_SHARED_SECRET`. Prints a JSON object with the canonical query
//! (for GET), the header name and the signature.
//!
//! `keygen` writes a new 2048-bit RSA pair as `private.pem` (PKCS#8, for the
//! client) and `public.pem` (SPKI, for `SHOPINO_PUBLIC_KEY_PATH`). Existing
//! files are never overwritten.

use std::collections::HashMap;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shopino::auth::canonical::canonical_query;
use shopino::config::DEFAULT_SIGNATURE_HEADER;
use shopino::auth::{generate_rsa_key_pair, RSA_KEY_BITS};
use shopino::SigningKey;

#[derive(Serialize)]
struct SignOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    canonical: Option<String>,
    header: &'static str,
    signature: String,
}

#[derive(Serialize)]
struct KeygenOutput {
    private_key: String,
    public_key: String,
    bits: usize,
}

fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_writer(io::stderr))
        .init();

    let mut args = env::args().skip(1);
    let mode = args
        .next()
        .ok_or_else(|| anyhow!("usage: shopino-sign <get key=value...|post|keygen [dir]>"))?
        .to_ascii_lowercase();

    if mode == "keygen" {
        return keygen(PathBuf::from(args.next().unwrap_or_else(|| ".".to_string())));
    }

    let key = load_signing_key()?;

    let (canonical, payload) = match mode.as_str() {
        "get" => {
            let params = parse_pairs(args)?;
            let canonical = canonical_query(&params)
                .ok_or_else(|| anyhow!("GET requests need at least one key=value parameter"))?;
            (Some(canonical.clone()), canonical.into_bytes())
        }
        "post" => {
            let mut body = Vec::new();
            io::stdin()
                .read_to_end(&mut body)
                .context("Failed to read body from stdin")?;
            if body.is_empty() {
                bail!("POST body on stdin is empty");
            }
            (None, body)
        }
        other => bail!("unknown mode '{}', expected 'get', 'post' or 'keygen'", other),
    };

    let signature = key
        .sign(&payload)
        .map_err(|e| anyhow!("Signing failed: {}", e))?;

    info!(mode = %mode, payload_length = payload.len(), "payload_signed");

    let output = SignOutput {
        canonical,
        header: DEFAULT_SIGNATURE_HEADER,
        signature,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

/// Write a fresh RSA key pair into `dir`.
fn keygen(dir: PathBuf) -> Result<()> {
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create key directory {}", dir.display()))?;

    let pair = generate_rsa_key_pair(RSA_KEY_BITS).context("Failed to generate RSA key pair")?;

    let private_path = dir.join("private.pem");
    let public_path = dir.join("public.pem");
    write_new(&private_path, &pair.private_pem, 0o600)?;
    write_new(&public_path, &pair.public_pem, 0o644)?;

    info!(bits = RSA_KEY_BITS, dir = %dir.display(), "key_pair_written");

    let output = KeygenOutput {
        private_key: private_path.display().to_string(),
        public_key: public_path.display().to_string(),
        bits: RSA_KEY_BITS,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

/// Create `path` with `contents`, failing if it already exists.
fn write_new(path: &Path, contents: &str, mode: u32) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create {} (it may already exist)", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn load_signing_key() -> Result<SigningKey> {
    if let Ok(path) = env::var("SHOPINO_PRIVATE_KEY_PATH") {
        let pem = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read private key {}", path))?;
        return SigningKey::from_pem(&pem).context("Unsupported private key");
    }

    match env::var("SHOPINO_SHARED_SECRET") {
        Ok(secret) if !secret.is_empty() => Ok(SigningKey::Shared(secret.into_bytes())),
        _ => bail!("set SHOPINO_PRIVATE_KEY_PATH or SHOPINO_SHARED_SECRET"),
    }
}

/// Parse `key=value` arguments. Later duplicates win.
fn parse_pairs(args: impl Iterator<Item = String>) -> Result<HashMap<String, String>> {
    args.map(|arg| {
        arg.split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .ok_or_else(|| anyhow!("expected key=value, got '{}'", arg))
    })
    .collect()
}

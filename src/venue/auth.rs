//! L2 (API-key) authentication headers for the CLOB REST API.
//!
//! The venue authenticates requests with an HMAC-SHA256 signature over
//! `timestamp + method + path [+ body]`, keyed by the base64url-decoded
//! API secret. Key derivation itself (L1, wallet-signed) happens out of
//! band; this module only builds the per-request headers from held
//! credentials.

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// API credentials as provisioned by the venue.
#[derive(Debug, Clone)]
pub struct ApiCreds {
    pub key: String,
    pub secret: String,
    pub passphrase: String,
}

impl ApiCreds {
    /// Read pre-provisioned credentials from `PM_API_*`, if all present.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("PM_API_KEY").ok()?;
        let secret = std::env::var("PM_API_SECRET").ok()?;
        let passphrase = std::env::var("PM_API_PASSPHRASE").ok()?;
        Some(Self {
            key,
            secret,
            passphrase,
        })
    }

    /// Truncated key prefix, safe to surface in diagnostics.
    pub fn key_prefix(&self) -> String {
        let n = self.key.len().min(8);
        format!("{}…", &self.key[..n])
    }
}

/// HMAC-SHA256 signature for one request, base64url-encoded.
pub fn l2_signature(
    secret: &str,
    timestamp: i64,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<String> {
    let key = URL_SAFE
        .decode(secret)
        .context("API secret is not valid base64url")?;

    let mut message = format!("{timestamp}{method}{path}");
    if let Some(body) = body {
        message.push_str(body);
    }

    let mut mac =
        HmacSha256::new_from_slice(&key).context("API secret has invalid length")?;
    mac.update(message.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

/// The header set the venue expects on authenticated calls.
pub fn l2_headers(
    address: &str,
    creds: &ApiCreds,
    timestamp: i64,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<Vec<(&'static str, String)>> {
    let sig = l2_signature(&creds.secret, timestamp, method, path, body)?;
    Ok(vec![
        ("POLY_ADDRESS", address.to_string()),
        ("POLY_SIGNATURE", sig),
        ("POLY_TIMESTAMP", timestamp.to_string()),
        ("POLY_API_KEY", creds.key.clone()),
        ("POLY_PASSPHRASE", creds.passphrase.clone()),
    ])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

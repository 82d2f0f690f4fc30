//! Opaque, signed pagination cursors for hit listings
//!
//! A cursor is `base64url(json).base64url(hmac_sha256)`; clients hand it
//! back unchanged as `?cursor=` to fetch the next page.

use anyhow::{anyhow, Result};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::OnceLock;
use subtle::ConstantTimeEq;

static HMAC_KEY: OnceLock<Vec<u8>> = OnceLock::new();

fn random_key() -> Vec<u8> {
    use rand::RngExt;
    let mut rng = rand::rng();
    (0..32).map(|_| rng.random::<u8>()).collect()
}

/// Set the signing key once at startup.
///
/// Without a configured secret a random key is used and outstanding
/// cursors stop verifying after a restart. Later calls are no-ops.
pub fn init_cursor_hmac_key(secret: Option<&str>) {
    let key = match secret {
        Some(s) if !s.is_empty() => s.as_bytes().to_vec(),
        _ => random_key(),
    };
    HMAC_KEY.get_or_init(|| key);
}

fn hmac_key() -> &'static [u8] {
    HMAC_KEY.get_or_init(random_key)
}

fn sign(payload: &str) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key())
        .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Position after the last hit of a page; the next page starts below `id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitCursor {
    pub id: i64,
}

pub fn encode_cursor(cursor: &HitCursor) -> Result<String> {
    let json = serde_json::to_string(cursor)?;
    let payload = BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes());
    let signature = BASE64_URL_SAFE_NO_PAD.encode(sign(&payload)?);
    Ok(format!("{payload}.{signature}"))
}

pub fn decode_cursor(cursor: &str) -> Result<HitCursor> {
    let (payload, signature) = cursor
        .split_once('.')
        .filter(|(_, sig)| !sig.contains('.'))
        .ok_or_else(|| anyhow!("Invalid cursor format"))?;

    let provided = BASE64_URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| anyhow!("Invalid cursor signature encoding"))?;
    let expected = sign(payload)?;
    if !bool::from(expected.ct_eq(&provided)) {
        return Err(anyhow!("Cursor signature verification failed"));
    }

    let json = BASE64_URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| anyhow!("Invalid cursor payload encoding"))?;
    serde_json::from_slice(&json).map_err(|_| anyhow!("Invalid cursor data"))
}

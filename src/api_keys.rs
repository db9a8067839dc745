// API keys for unattended clients: generation, hashing and verification

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::models::ApiKey;
use crate::store::Stores;

pub const KEY_PREFIX: &str = "cmdb_";
pub const KEY_RANDOM_BYTES: usize = 48;
pub const DISPLAY_PREFIX_LEN: usize = 12;

pub const INVALID_API_KEY: &str = "Invalid API key";

/// Generates `cmdb_` followed by 48 random bytes, URL-safe base64 without padding.
/// A failing random source is an error; there is no fallback.
pub fn generate_api_key() -> Result<String, rand::Error> {
    let mut bytes = [0u8; KEY_RANDOM_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(format!("{}{}", KEY_PREFIX, URL_SAFE_NO_PAD.encode(bytes)))
}

/// SHA-256 of the raw key, lowercase hex.
pub fn hash_api_key(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}

/// First 12 characters, kept for display.
pub fn key_prefix(raw_key: &str) -> String {
    raw_key.chars().take(DISPLAY_PREFIX_LEN).collect()
}

/// Resolves a presented key to its record.
///
/// Unknown, inactive and expired keys produce the same 401. On success
/// `last_used_at` is advanced in the background; a failed write is only logged.
pub async fn verify_and_touch(stores: &Stores, raw_key: &str) -> Result<ApiKey, ApiError> {
    let now = Utc::now();
    let key_hash = hash_api_key(raw_key);

    let mut key = stores
        .api_keys
        .find_by_hash(&key_hash)
        .await
        .map_err(ApiError::store("API key"))?
        .filter(|key| key.is_usable_at(now))
        .ok_or_else(|| ApiError::unauthorized(INVALID_API_KEY))?;

    let api_keys = stores.api_keys.clone();
    let key_id = key.id.clone();
    tokio::spawn(async move {
        if let Err(e) = api_keys.touch(&key_id, now).await {
            tracing::debug!(api_key_id = %key_id, "Failed to update last_used_at: {}", e);
        }
    });

    key.last_used_at = Some(now);
    Ok(key)
}

// Metric ingest for agents holding an API key

use axum::{body::Bytes, extract::State, http::HeaderMap, response::Json};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::api_keys::{verify_and_touch, INVALID_API_KEY};
use crate::error::ApiError;
use crate::middleware::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Verifies the key before looking at the body. The payload is parsed and dropped.
pub async fn ingest_metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let raw_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::unauthorized(INVALID_API_KEY))?;

    let key = verify_and_touch(&state.stores, raw_key).await?;

    let payload: Map<String, Value> = serde_json::from_slice(&body)
        .map_err(|_| ApiError::validation("Invalid JSON body"))?;

    tracing::debug!(
        api_key_id = %key.id,
        fields = payload.len(),
        "Ingest payload accepted"
    );

    Ok(Json(json!({ "status": "received" })))
}

// API key management handlers

use axum::{extract::State, http::StatusCode, response::Json, Extension};
use std::sync::Arc;
use tracing::info;

use crate::api_keys::{generate_api_key, hash_api_key, key_prefix};
use crate::api_models::{
    ApiKeyIdRequest, ApiKeyResponse, ApiKeyStatusRequest, CreateApiKeyRequest,
    CreatedApiKeyResponse, MessageResponse,
};
use crate::authz;
use crate::error::ApiError;
use crate::extract::{validate, JsonBody};
use crate::middleware::{AppState, CurrentUser};
use crate::models::NewApiKey;

pub async fn list_api_keys(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<ApiKeyResponse>>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    let keys = state
        .stores
        .api_keys
        .list()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch API keys", e))?;

    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

/// The raw key appears in this response only.
pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    JsonBody(payload): JsonBody<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreatedApiKeyResponse>), ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;
    validate(&payload)?;

    let raw_key =
        generate_api_key().map_err(|e| ApiError::internal("Failed to generate API key", e))?;

    let record = state
        .stores
        .api_keys
        .create(NewApiKey {
            name: payload.name,
            key_hash: hash_api_key(&raw_key),
            key_prefix: key_prefix(&raw_key),
            created_by: current_user.id.clone(),
            expires_at: payload.expires_at,
        })
        .await
        .map_err(|e| ApiError::internal("Failed to create API key", e))?;

    info!(api_key_id = %record.id, key_prefix = %record.key_prefix, "API key created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedApiKeyResponse {
            key: raw_key,
            key_prefix: record.key_prefix.clone(),
            record: record.into(),
        }),
    ))
}

pub async fn set_api_key_status(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    JsonBody(payload): JsonBody<ApiKeyStatusRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;
    validate(&payload)?;

    state
        .stores
        .api_keys
        .set_active(&payload.id, payload.active)
        .await
        .map_err(ApiError::store("API key"))?;

    info!(api_key_id = %payload.id, active = payload.active, "API key status changed");
    Ok(Json(MessageResponse::new("updated")))
}

pub async fn delete_api_key(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    JsonBody(payload): JsonBody<ApiKeyIdRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;
    validate(&payload)?;

    state
        .stores
        .api_keys
        .delete(&payload.id)
        .await
        .map_err(ApiError::store("API key"))?;

    info!(api_key_id = %payload.id, "API key deleted");
    Ok(Json(MessageResponse::new("deleted")))
}

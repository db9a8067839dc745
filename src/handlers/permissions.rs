// Per-server access grants

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use std::sync::Arc;
use tracing::info;

use crate::api_models::{GrantRequest, MessageResponse};
use crate::authz;
use crate::error::ApiError;
use crate::extract::{validate, JsonBody};
use crate::middleware::{AppState, CurrentUser};
use crate::models::UserServerPermission;

pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<UserServerPermission>>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    let grants = state
        .stores
        .permissions
        .list()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch permissions", e))?;
    Ok(Json(grants))
}

pub async fn create_permission(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    JsonBody(payload): JsonBody<GrantRequest>,
) -> Result<(StatusCode, Json<UserServerPermission>), ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;
    validate(&payload)?;

    state
        .stores
        .users
        .get(&payload.user_id)
        .await
        .map_err(ApiError::store("User"))?;
    state
        .stores
        .servers
        .get(&payload.server_id)
        .await
        .map_err(ApiError::store("Server"))?;

    let grant = state
        .stores
        .permissions
        .grant(&payload.user_id, &payload.server_id)
        .await
        .map_err(|e| ApiError::internal("Failed to create permission", e))?;

    info!(
        user_id = %grant.user_id,
        server_id = %grant.server_id,
        "Server access granted"
    );
    Ok((StatusCode::CREATED, Json(grant)))
}

pub async fn delete_permission(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(permission_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    state
        .stores
        .permissions
        .revoke(&permission_id)
        .await
        .map_err(ApiError::store("Permission"))?;

    Ok(Json(MessageResponse::new("Permission deleted successfully")))
}

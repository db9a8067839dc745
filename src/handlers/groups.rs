// Server group handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use std::sync::Arc;

use crate::api_models::{GroupRequest, MessageResponse};
use crate::authz;
use crate::error::ApiError;
use crate::extract::{validate, JsonBody};
use crate::middleware::{AppState, CurrentUser};
use crate::models::{NewServerGroup, ServerGroup};

fn into_group(payload: GroupRequest) -> Result<NewServerGroup, ApiError> {
    validate(&payload)?;
    payload
        .into_new_group()
        .ok_or_else(|| ApiError::validation("color must be a hex value like #06b6d4"))
}

pub async fn list_groups(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ServerGroup>>, ApiError> {
    let groups = state
        .stores
        .groups
        .list()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch groups", e))?;
    Ok(Json(groups))
}

pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Result<Json<ServerGroup>, ApiError> {
    let group = state
        .stores
        .groups
        .get(&group_id)
        .await
        .map_err(ApiError::store("Group"))?;
    Ok(Json(group))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    JsonBody(payload): JsonBody<GroupRequest>,
) -> Result<(StatusCode, Json<ServerGroup>), ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    let group = state
        .stores
        .groups
        .create(into_group(payload)?)
        .await
        .map_err(|e| ApiError::internal("Failed to create group", e))?;

    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn update_group(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(group_id): Path<String>,
    JsonBody(payload): JsonBody<GroupRequest>,
) -> Result<Json<ServerGroup>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    let group = state
        .stores
        .groups
        .update(&group_id, into_group(payload)?)
        .await
        .map_err(ApiError::store("Group"))?;

    Ok(Json(group))
}

pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(group_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    state
        .stores
        .groups
        .delete(&group_id)
        .await
        .map_err(ApiError::store("Group"))?;

    Ok(Json(MessageResponse::new("Group deleted successfully")))
}

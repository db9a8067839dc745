// Server registry handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use std::sync::Arc;
use tracing::info;

use crate::api_models::{MessageResponse, ServerRequest};
use crate::authz;
use crate::error::ApiError;
use crate::extract::{validate, JsonBody};
use crate::middleware::{AppState, CurrentUser};
use crate::models::{NewServer, Server};
use crate::store::{StoreError, Stores};

async fn check_group(stores: &Stores, server: &NewServer) -> Result<(), ApiError> {
    let Some(group_id) = server.group_id.as_deref() else {
        return Ok(());
    };
    match stores.groups.get(group_id).await {
        Ok(_) => Ok(()),
        Err(StoreError::NotFound) => Err(ApiError::validation("Unknown group_id")),
        Err(e) => Err(ApiError::internal("Failed to fetch group", e)),
    }
}

pub async fn list_servers(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<Server>>, ApiError> {
    let is_admin = authz::is_admin(&state.stores, &current_user).await?;

    let servers = state
        .stores
        .servers
        .list(&current_user.id, is_admin)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch servers", e))?;

    Ok(Json(servers))
}

pub async fn create_server(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    JsonBody(payload): JsonBody<ServerRequest>,
) -> Result<(StatusCode, Json<Server>), ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;
    validate(&payload)?;

    let new_server = payload.into_new_server();
    check_group(&state.stores, &new_server).await?;

    let server = state
        .stores
        .servers
        .create(new_server)
        .await
        .map_err(|e| ApiError::internal("Failed to create server", e))?;

    info!(server_id = %server.id, hostname = %server.hostname, "Server created");
    Ok((StatusCode::CREATED, Json(server)))
}

pub async fn get_server(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(server_id): Path<String>,
) -> Result<Json<Server>, ApiError> {
    let server = state
        .stores
        .servers
        .get(&server_id)
        .await
        .map_err(ApiError::store("Server"))?;

    authz::require_server_access(&state.stores, &current_user, &server.id).await?;

    Ok(Json(server))
}

// Full replacement: omitted optional fields are reset to their defaults.
pub async fn update_server(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(server_id): Path<String>,
    JsonBody(payload): JsonBody<ServerRequest>,
) -> Result<Json<Server>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;
    validate(&payload)?;

    let replacement = payload.into_new_server();
    check_group(&state.stores, &replacement).await?;

    let server = state
        .stores
        .servers
        .update(&server_id, replacement)
        .await
        .map_err(ApiError::store("Server"))?;

    Ok(Json(server))
}

pub async fn delete_server(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(server_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    state
        .stores
        .servers
        .delete(&server_id)
        .await
        .map_err(ApiError::store("Server"))?;

    info!(server_id = %server_id, "Server deleted");
    Ok(Json(MessageResponse::new("Server deleted successfully")))
}

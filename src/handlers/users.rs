// User administration handlers

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use std::sync::Arc;
use tracing::info;

use crate::api_models::{
    MessageResponse, SetRolesRequest, UpdateUserRequest, UserListItem, UserWithRolesResponse,
};
use crate::authz;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::middleware::{AppState, CurrentUser};
use crate::models::UserPatch;

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<UserListItem>>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    let users = state
        .stores
        .users
        .list()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch users", e))?;

    let mut items = Vec::with_capacity(users.len());
    for user in users {
        let roles = state
            .stores
            .users
            .roles(&user.id)
            .await
            .map_err(|e| ApiError::internal("Failed to fetch roles", e))?;
        items.push(UserListItem {
            user: user.into(),
            roles,
        });
    }

    Ok(Json(items))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(user_id): Path<String>,
) -> Result<Json<UserWithRolesResponse>, ApiError> {
    authz::require_self_or_admin(&state.stores, &current_user, &user_id).await?;

    let user = state
        .stores
        .users
        .get(&user_id)
        .await
        .map_err(ApiError::store("User"))?;
    let roles = state
        .stores
        .users
        .roles(&user.id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch roles", e))?;

    Ok(Json(UserWithRolesResponse {
        user: user.into(),
        roles,
    }))
}

/// Subjects may edit their own display name; approval is admin-only.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(user_id): Path<String>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let is_admin = authz::is_admin(&state.stores, &current_user).await?;
    if !is_admin && current_user.id != user_id {
        return Err(ApiError::forbidden("Access denied"));
    }
    if payload.approved.is_some() && !is_admin {
        return Err(ApiError::forbidden("Only admins can change approval status"));
    }

    state
        .stores
        .users
        .update(
            &user_id,
            UserPatch {
                display_name: payload.display_name,
                approved: payload.approved,
            },
        )
        .await
        .map_err(ApiError::store("User"))?;

    Ok(Json(MessageResponse::new("User updated successfully")))
}

pub async fn approve_user(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(user_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    state
        .stores
        .users
        .update(
            &user_id,
            UserPatch {
                approved: Some(true),
                ..Default::default()
            },
        )
        .await
        .map_err(ApiError::store("User"))?;

    info!(user_id = %user_id, approved_by = %current_user.id, "User approved");
    Ok(Json(MessageResponse::new("User approved successfully")))
}

pub async fn set_user_roles(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(user_id): Path<String>,
    JsonBody(payload): JsonBody<SetRolesRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    state
        .stores
        .users
        .get(&user_id)
        .await
        .map_err(ApiError::store("User"))?;

    let mut roles: Vec<String> = Vec::with_capacity(payload.roles.len());
    for role in payload.roles {
        let role = role.trim().to_string();
        if !role.is_empty() && !roles.contains(&role) {
            roles.push(role);
        }
    }

    state
        .stores
        .users
        .set_roles(&user_id, &roles)
        .await
        .map_err(|e| ApiError::internal("Failed to update roles", e))?;

    info!(user_id = %user_id, roles = ?roles, "User roles replaced");
    Ok(Json(MessageResponse::new("Roles updated successfully")))
}

// Authentication handlers (signup, login, me, logout)

use axum::{extract::State, http::StatusCode, response::Json, Extension};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api_models::{
    LoginRequest, LoginResponse, MessageResponse, SignupRequest, SignupResponse,
    UserWithRolesResponse,
};
use crate::auth::{hash_password, verify_password, Claims};
use crate::error::ApiError;
use crate::extract::{validate, JsonBody};
use crate::middleware::{AppState, CurrentUser};
use crate::models::{NewUser, UserPatch};

// Same response for unknown email and wrong password.
fn invalid_credentials() -> ApiError {
    ApiError::unauthorized("Invalid credentials")
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    validate(&payload)?;

    let username = payload
        .username
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| payload.email.clone());
    let password_hash = hash_password(payload.password, state.password_cost).await?;

    let mut user = state
        .stores
        .users
        .create(NewUser {
            username,
            email: payload.email,
            password_hash,
        })
        .await
        .map_err(ApiError::store("User"))?;

    if !state.auto_approve_signups {
        info!(user_id = %user.id, "User signed up, awaiting approval");
        return Ok((
            StatusCode::CREATED,
            Json(SignupResponse {
                user: user.into(),
                token: None,
            }),
        ));
    }

    state
        .stores
        .users
        .update(
            &user.id,
            UserPatch {
                approved: Some(true),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| ApiError::internal("Failed to approve user", e))?;
    user.approved = true;

    let token = state
        .jwt_manager
        .create_token(&Claims::new(&user.id, &user.email))?;

    info!(user_id = %user.id, "User signed up");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user: user.into(),
            token: Some(token),
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    validate(&payload)?;

    let user = state
        .stores
        .users
        .find_by_email(&payload.email)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch user", e))?
        .ok_or_else(invalid_credentials)?;

    let password_ok = match verify_password(payload.password, user.password_hash.clone()).await {
        Ok(ok) => ok,
        Err(e) => {
            warn!(user_id = %user.id, "Password verification error: {}", e);
            false
        }
    };
    if !password_ok {
        return Err(invalid_credentials());
    }

    if !user.approved {
        return Err(ApiError::forbidden("Your account is pending approval"));
    }

    let token = state
        .jwt_manager
        .create_token(&Claims::new(&user.id, &user.email))?;
    let roles = state
        .stores
        .users
        .roles(&user.id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch roles", e))?;

    info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        user: user.into(),
        token,
        roles,
    }))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<UserWithRolesResponse>, ApiError> {
    let user = state
        .stores
        .users
        .get(&current_user.id)
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

// Tokens are stateless; the client discards its copy.
pub async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse::new("Logged out successfully"))
}

// Authorization gate: role membership and per-server grants

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::models::ADMIN_ROLE;
use crate::store::Stores;

pub async fn is_admin(stores: &Stores, user: &CurrentUser) -> Result<bool, ApiError> {
    stores
        .users
        .has_role(&user.id, ADMIN_ROLE)
        .await
        .map_err(|e| ApiError::internal("Failed to check permissions", e))
}

pub async fn require_admin(stores: &Stores, user: &CurrentUser) -> Result<(), ApiError> {
    if is_admin(stores, user).await? {
        Ok(())
    } else {
        Err(ApiError::forbidden("Admin access required"))
    }
}

/// Admins pass unconditionally; everyone else needs a grant on the server.
pub async fn require_server_access(
    stores: &Stores,
    user: &CurrentUser,
    server_id: &str,
) -> Result<(), ApiError> {
    if is_admin(stores, user).await? {
        return Ok(());
    }

    let granted = stores
        .permissions
        .has_access(&user.id, server_id)
        .await
        .map_err(|e| ApiError::internal("Failed to check permissions", e))?;

    if granted {
        Ok(())
    } else {
        Err(ApiError::forbidden("Access denied"))
    }
}

pub async fn require_self_or_admin(
    stores: &Stores,
    user: &CurrentUser,
    subject_id: &str,
) -> Result<(), ApiError> {
    if user.id == subject_id || is_admin(stores, user).await? {
        Ok(())
    } else {
        Err(ApiError::forbidden("Access denied"))
    }
}

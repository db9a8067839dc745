// SSL certificate records

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use std::sync::Arc;

use crate::api_models::{MessageResponse, SslCertificateRequest};
use crate::authz;
use crate::error::ApiError;
use crate::extract::{validate, JsonBody};
use crate::middleware::{AppState, CurrentUser};
use crate::models::{NewSslCertificate, SslCertificate};

async fn checked_certificate(
    state: &AppState,
    payload: SslCertificateRequest,
) -> Result<NewSslCertificate, ApiError> {
    validate(&payload)?;
    state
        .stores
        .servers
        .get(&payload.server_id)
        .await
        .map_err(ApiError::store("Server"))?;
    Ok(payload.into_new_certificate())
}

pub async fn list_certificates(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<SslCertificate>>, ApiError> {
    let is_admin = authz::is_admin(&state.stores, &current_user).await?;

    let certs = state
        .stores
        .certificates
        .list(&current_user.id, is_admin)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch certificates", e))?;

    Ok(Json(certs))
}

pub async fn create_certificate(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    JsonBody(payload): JsonBody<SslCertificateRequest>,
) -> Result<(StatusCode, Json<SslCertificate>), ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;
    let new_cert = checked_certificate(&state, payload).await?;

    let cert = state
        .stores
        .certificates
        .create(new_cert)
        .await
        .map_err(|e| ApiError::internal("Failed to create certificate", e))?;

    Ok((StatusCode::CREATED, Json(cert)))
}

/// Readable by admins and by anyone granted the certificate's server.
pub async fn get_certificate(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(cert_id): Path<String>,
) -> Result<Json<SslCertificate>, ApiError> {
    let cert = state
        .stores
        .certificates
        .get(&cert_id)
        .await
        .map_err(ApiError::store("Certificate"))?;

    authz::require_server_access(&state.stores, &current_user, &cert.server_id).await?;

    Ok(Json(cert))
}

pub async fn update_certificate(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(cert_id): Path<String>,
    JsonBody(payload): JsonBody<SslCertificateRequest>,
) -> Result<Json<SslCertificate>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;
    let replacement = checked_certificate(&state, payload).await?;

    let cert = state
        .stores
        .certificates
        .update(&cert_id, replacement)
        .await
        .map_err(ApiError::store("Certificate"))?;

    Ok(Json(cert))
}

pub async fn delete_certificate(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(cert_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;

    state
        .stores
        .certificates
        .delete(&cert_id)
        .await
        .map_err(ApiError::store("Certificate"))?;

    Ok(Json(MessageResponse::new("Certificate deleted successfully")))
}

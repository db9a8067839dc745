// Unauthenticated scrape endpoint for certificate expiry

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use chrono::Utc;
use std::sync::Arc;

use crate::error::ApiError;
use crate::metrics::{self, render_certificate_metrics};
use crate::middleware::AppState;

pub async fn certificate_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let certs = state
        .stores
        .certificates
        .list("", true)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch certificates", e))?;

    Ok((
        [(CONTENT_TYPE, metrics::CONTENT_TYPE)],
        render_certificate_metrics(&certs, now),
    ))
}

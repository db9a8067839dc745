// Push certificate expiry alerts to Alertmanager

use axum::{extract::State, response::Json, Extension};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::alerts::build_alerts;
use crate::api_models::SendAlertsRequest;
use crate::authz;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::middleware::{AppState, CurrentUser};

pub async fn send_alerts(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    JsonBody(payload): JsonBody<SendAlertsRequest>,
) -> Result<Json<Value>, ApiError> {
    authz::require_admin(&state.stores, &current_user).await?;
    if payload.alertmanager_url.trim().is_empty() {
        return Err(ApiError::validation("alertmanager_url is required"));
    }

    let certs = state
        .stores
        .certificates
        .list(&current_user.id, true)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch certificates", e))?;

    let now = Utc::now();
    let alerts = build_alerts(&certs, now);

    if alerts.is_empty() {
        return Ok(Json(json!({
            "message": "No expiring certificates found",
            "sent": 0
        })));
    }

    state
        .alert_publisher
        .publish(&payload.alertmanager_url, &alerts)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    info!(sent = alerts.len(), requested_by = %current_user.id, "Certificate alerts sent");

    Ok(Json(json!({
        "message": "Alerts sent successfully",
        "sent": alerts.len(),
        "alerts": alerts
    })))
}

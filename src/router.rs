// Route table

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{self, AppState};

pub fn build(state: Arc<AppState>) -> Router {
    // Protected routes (authentication required)
    let protected = Router::new()
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/users", get(handlers::users::list_users))
        .route(
            "/api/users/:id",
            get(handlers::users::get_user).put(handlers::users::update_user),
        )
        .route("/api/users/:id/approve", post(handlers::users::approve_user))
        .route("/api/users/:id/roles", post(handlers::users::set_user_roles))
        .route(
            "/api/servers",
            get(handlers::servers::list_servers).post(handlers::servers::create_server),
        )
        .route(
            "/api/servers/:id",
            get(handlers::servers::get_server)
                .put(handlers::servers::update_server)
                .delete(handlers::servers::delete_server),
        )
        .route(
            "/api/groups",
            get(handlers::groups::list_groups).post(handlers::groups::create_group),
        )
        .route(
            "/api/groups/:id",
            get(handlers::groups::get_group)
                .put(handlers::groups::update_group)
                .delete(handlers::groups::delete_group),
        )
        .route(
            "/api/permissions",
            get(handlers::permissions::list_permissions)
                .post(handlers::permissions::create_permission),
        )
        .route(
            "/api/permissions/:id",
            delete(handlers::permissions::delete_permission),
        )
        .route(
            "/api/api-keys",
            get(handlers::api_keys::list_api_keys).post(handlers::api_keys::create_api_key),
        )
        .route(
            "/api/api-keys/status",
            post(handlers::api_keys::set_api_key_status),
        )
        .route("/api/api-keys/delete", post(handlers::api_keys::delete_api_key))
        .route(
            "/api/ssl-certificates",
            get(handlers::ssl_certificates::list_certificates)
                .post(handlers::ssl_certificates::create_certificate),
        )
        .route(
            "/api/ssl-certificates/send-alerts",
            post(handlers::alerts::send_alerts),
        )
        .route(
            "/api/ssl-certificates/:id",
            get(handlers::ssl_certificates::get_certificate)
                .put(handlers::ssl_certificates::update_certificate)
                .delete(handlers::ssl_certificates::delete_certificate),
        )
        // Apply authentication middleware only to protected routes
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    // Public routes (no bearer token; ingest and the shell bridge check their own credentials)
    let public = Router::new()
        .route("/api/auth/signup", post(handlers::auth::signup))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::certificate_metrics))
        .route("/api/ingest/metrics", post(handlers::ingest::ingest_metrics))
        .route("/ws/ssh/:server_id", get(handlers::ssh::ssh_bridge));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub mod alerts;
pub mod api_keys;
pub mod api_models;
pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod router;
pub mod shell;
pub mod store;

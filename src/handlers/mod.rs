// Request handlers, one module per resource

pub mod alerts;
pub mod api_keys;
pub mod auth;
pub mod groups;
pub mod health;
pub mod ingest;
pub mod metrics;
pub mod permissions;
pub mod servers;
pub mod ssh;
pub mod ssl_certificates;
pub mod users;

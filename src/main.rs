use anyhow::Context;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cmdb::config::Config;
use cmdb::middleware::AppState;
use cmdb::router;
use cmdb::store::Stores;

const DB_CONNECT_ATTEMPTS: u32 = 10;
const DB_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let cfg = Config::from_env().context("Failed to load configuration")?;

    let pool = connect_database(&cfg.database_url).await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    info!("Database migrations completed successfully");

    // Create application state
    let mut state = AppState::new(Stores::postgres(pool), &cfg.jwt_secret());
    state.auto_approve_signups = cfg.auto_approve_signups;
    state.shell = cfg.shell_options();

    let app = router::build(Arc::new(state)).layer(cfg.cors_layer());

    // Start server
    let addr = format!("0.0.0.0:{}", cfg.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Server starting on {}", addr);

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}

/// The database may still be starting; retry the ping before giving up.
async fn connect_database(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect_lazy(database_url)
        .context("Invalid DATABASE_URL")?;

    for attempt in 1..=DB_CONNECT_ATTEMPTS {
        match sqlx::query("SELECT 1").execute(&pool).await {
            Ok(_) => {
                info!("Connected to Postgres");
                return Ok(pool);
            }
            Err(e) => {
                warn!(
                    attempt,
                    max_attempts = DB_CONNECT_ATTEMPTS,
                    "Database not reachable yet: {}",
                    e
                );
                if attempt < DB_CONNECT_ATTEMPTS {
                    tokio::time::sleep(DB_RETRY_DELAY).await;
                }
            }
        }
    }

    anyhow::bail!(
        "Failed to connect to Postgres after {} attempts",
        DB_CONNECT_ATTEMPTS
    )
}

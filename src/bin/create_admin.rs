// Bootstrap an approved administrator account

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use cmdb::auth::hash_password;
use cmdb::models::{NewUser, UserPatch, ADMIN_ROLE};
use cmdb::store::Stores;

#[derive(Parser, Debug)]
#[command(name = "create-admin", about = "Create the first admin account")]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "ADMIN_USERNAME", default_value = "admin")]
    username: String,

    #[arg(long, env = "ADMIN_EMAIL")]
    email: String,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    password: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let args = Args::parse();

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&args.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let stores = Stores::postgres(pool);

    if let Some(existing) = stores.users.find_by_email(&args.email).await? {
        info!(user_id = %existing.id, "User {} already exists, nothing to do", args.email);
        return Ok(());
    }

    let password_hash = hash_password(args.password, bcrypt::DEFAULT_COST).await?;

    let user = stores
        .users
        .create(NewUser {
            username: args.username,
            email: args.email,
            password_hash,
        })
        .await?;

    stores
        .users
        .update(
            &user.id,
            UserPatch {
                approved: Some(true),
                ..Default::default()
            },
        )
        .await?;
    stores
        .users
        .set_roles(&user.id, &[ADMIN_ROLE.to_string()])
        .await?;

    info!(user_id = %user.id, "Admin user {} created", user.email);
    Ok(())
}

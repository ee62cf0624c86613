use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use curio_catalog::{CatalogConfig, DbotClient};
use curio_db::store::PgTreeStore;

mod cli;
mod commands;
mod config;

use cli::Cli;
use config::DatabaseConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curio_worker=debug,curio_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // --- Configuration ---
    let db_config = DatabaseConfig::from_env();
    let catalog_config = CatalogConfig::from_env();
    tracing::info!(
        max_connections = db_config.max_connections,
        catalog = %catalog_config.base_url,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = curio_db::create_pool(&db_config.url, db_config.max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    curio_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    curio_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Catalog ---
    let catalog = DbotClient::new(&catalog_config).context("Failed to build catalog client")?;

    let store = PgTreeStore::new(pool.clone());
    let report = commands::run(cli.command, cli.user, &store, &catalog).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    pool.close().await;
    Ok(())
}

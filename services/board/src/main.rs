use std::sync::Arc;

use anyhow::Result;
use board::payment::StripeCheckout;
use board::repositories::Repositories;
use board::{AppState, create_router};
use common::database::{DatabaseConfig, health_check, init_pool};
use common::{BoardConfig, StorageBackend};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("setting default subscriber failed: {}", e))?;

    info!("Starting job board");

    let config = BoardConfig::from_env()?;
    config.warn_insecure_defaults();

    let repositories = match config.storage {
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = init_pool(&db_config).await?;

            if health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }

            Repositories::postgres(pool)
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; data is lost on restart");
            Repositories::memory()
        }
    };

    let payments = Arc::new(StripeCheckout::from_config(&config)?);
    let bind_address = config.bind_address.clone();
    let app = create_router(AppState::new(config, repositories, payments));

    let listener = TcpListener::bind(&bind_address).await?;
    info!("Job board listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

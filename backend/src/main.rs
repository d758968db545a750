//! Contractor Inventory Ledger - Backend Server
//!
//! Tracks warehouse and service-vehicle stock for an electrical contractor,
//! with a ledger behind every quantity change.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use inventory_ledger::{
    config::{Config, StorageBackend},
    create_app,
    store::{MemoryStore, PgStore, RetryPolicy, RetryingStore},
    AppState,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "inventory_ledger=debug,ledger_server=debug,tower_http=debug,sqlx=warn".into()
    });
    let json_logs = std::env::var("CIB_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Contractor Inventory Ledger Server");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!(
        "Adjustment mode: {}, missing assemblies: {}",
        config.ledger.adjustment_mode.as_str(),
        config.ledger.missing_assembly_policy.as_str()
    );

    let policy = RetryPolicy::from(&config.persistence);

    let state = match config.database.backend {
        StorageBackend::Postgres => {
            // Create database connection pool
            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
                .connect(&config.database.url)
                .await?;

            tracing::info!("Database connection established");

            // Run migrations in development
            if config.environment == "development" {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("./migrations").run(&db_pool).await?;
                tracing::info!("Migrations completed");
            }

            let store = RetryingStore::new(Arc::new(PgStore::new(db_pool.clone())), policy);
            AppState::new(Arc::new(store), config.clone()).with_database(db_pool)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; all stock data is lost on restart");
            let store = RetryingStore::new(Arc::new(MemoryStore::new()), policy);
            AppState::new(Arc::new(store), config.clone())
        }
    };

    // Build application
    let app = create_app(state);

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

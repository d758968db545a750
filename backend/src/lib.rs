//! Contractor inventory ledger - backend library
//!
//! Warehouse and vehicle stock levels backed by an append-only transaction
//! ledger, two-leg transfers with compensation, estimate-driven material
//! takeoffs, and CSV bulk import/export.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use services::{CsvService, LevelStore, TakeoffService, TransactionLog, TransferCoordinator};
use store::{CatalogSource, EstimateSource, InventoryStore, TakeoffStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InventoryStore>,
    pub takeoffs: Arc<dyn TakeoffStore>,
    pub catalog: Arc<dyn CatalogSource>,
    pub estimates: Arc<dyn EstimateSource>,
    /// Present when backed by PostgreSQL; used by the health check
    pub db: Option<sqlx::PgPool>,
    pub config: Arc<Config>,
}

impl AppState {
    /// State over one adapter that serves every port
    pub fn new<S>(store: Arc<S>, config: Config) -> Self
    where
        S: InventoryStore + TakeoffStore + CatalogSource + EstimateSource + 'static,
    {
        Self {
            store: store.clone(),
            takeoffs: store.clone(),
            catalog: store.clone(),
            estimates: store,
            db: None,
            config: Arc::new(config),
        }
    }

    pub fn with_database(mut self, db: sqlx::PgPool) -> Self {
        self.db = Some(db);
        self
    }

    pub fn levels(&self) -> LevelStore {
        LevelStore::new(self.store.clone(), self.config.ledger.max_cas_retries)
    }

    pub fn ledger(&self) -> TransactionLog {
        TransactionLog::new(self.store.clone(), &self.config.ledger)
    }

    pub fn transfers(&self) -> TransferCoordinator {
        TransferCoordinator::new(self.ledger())
    }

    pub fn csv(&self) -> CsvService {
        CsvService::new(self.levels(), self.catalog.clone())
    }

    pub fn takeoff_service(&self) -> TakeoffService {
        TakeoffService::new(
            self.takeoffs.clone(),
            self.catalog.clone(),
            self.estimates.clone(),
            self.store.clone(),
            self.ledger(),
            self.config.ledger.missing_assembly_policy,
        )
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", routes::api_routes(&state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Contractor Inventory Ledger API v1.0"
}

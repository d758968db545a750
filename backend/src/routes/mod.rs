//! Route definitions for the inventory ledger API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - stock levels, ledger and transfers
        .nest("/inventory", inventory_routes(state))
        // Protected routes - takeoffs
        .merge(takeoff_routes(state))
}

/// Inventory routes (protected)
fn inventory_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Warehouse levels
        .route("/warehouse/levels", get(handlers::list_warehouse_levels))
        .route(
            "/warehouse/levels/:material_id",
            get(handlers::get_warehouse_level).put(handlers::put_warehouse_level),
        )
        .route(
            "/warehouse/levels/:material_id/stock-check",
            post(handlers::check_warehouse_level),
        )
        .route("/warehouse/low-stock", get(handlers::get_low_stock))
        .route("/warehouse/import", post(handlers::import_warehouse))
        .route("/warehouse/export", get(handlers::export_warehouse))
        // Vehicle levels
        .route("/vehicles/:vehicle_id/levels", get(handlers::list_vehicle_levels))
        .route(
            "/vehicles/:vehicle_id/levels/:material_id",
            get(handlers::get_vehicle_level).put(handlers::put_vehicle_level),
        )
        .route(
            "/vehicles/:vehicle_id/levels/:material_id/stock-check",
            post(handlers::check_vehicle_level),
        )
        .route("/vehicles/:vehicle_id/restock", get(handlers::get_vehicle_restock))
        .route("/vehicles/:vehicle_id/import", post(handlers::import_vehicle))
        .route("/vehicles/:vehicle_id/export", get(handlers::export_vehicle))
        // Vehicle movements
        .route("/vehicles/:vehicle_id/allocate", post(handlers::allocate_to_vehicle))
        .route("/vehicles/:vehicle_id/return", post(handlers::return_to_warehouse))
        // Ledger
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::record_transaction),
        )
        .route("/transfers", post(handlers::create_transfer))
        .route("/reconcile", get(handlers::reconcile))
        .route("/repair", post(handlers::repair))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Takeoff routes (protected)
fn takeoff_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:project_id/takeoffs",
            get(handlers::list_takeoffs).post(handlers::generate_takeoff),
        )
        .route("/takeoffs/:takeoff_id", get(handlers::get_takeoff))
        .route("/takeoffs/:takeoff_id/status", put(handlers::update_takeoff_status))
        .route("/takeoffs/:takeoff_id/allocate", post(handlers::allocate_takeoff))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

//! HTTP handlers for stock movements between scopes

use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::transfer::{TransferReceipt, TransferRequest};
use crate::AppState;

/// Input for moving stock between the warehouse and a vehicle
#[derive(Debug, Deserialize)]
pub struct VehicleMovementInput {
    pub material_id: String,
    pub quantity: Decimal,
    pub reference: Option<String>,
}

/// Move stock between any two scopes
pub async fn create_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<TransferRequest>,
) -> AppResult<Json<TransferReceipt>> {
    let receipt = state
        .transfers()
        .transfer(input, current_user.0.user_id)
        .await?;
    Ok(Json(receipt))
}

/// Load a vehicle from the caller's warehouse
pub async fn allocate_to_vehicle(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
    Json(input): Json<VehicleMovementInput>,
) -> AppResult<Json<TransferReceipt>> {
    let receipt = state
        .transfers()
        .allocate_to_vehicle(
            current_user.0.company_id,
            vehicle_id,
            input.material_id,
            input.quantity,
            input.reference,
            current_user.0.user_id,
        )
        .await?;
    Ok(Json(receipt))
}

/// Unload a vehicle back into the caller's warehouse
pub async fn return_to_warehouse(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
    Json(input): Json<VehicleMovementInput>,
) -> AppResult<Json<TransferReceipt>> {
    let receipt = state
        .transfers()
        .return_to_warehouse(
            vehicle_id,
            current_user.0.company_id,
            input.material_id,
            input.quantity,
            input.reference,
            current_user.0.user_id,
        )
        .await?;
    Ok(Json(receipt))
}

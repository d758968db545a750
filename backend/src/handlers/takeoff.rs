//! HTTP handlers for material takeoffs

use axum::{
    extract::{Path, State},
    Json,
};
use shared::MaterialTakeoff;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::takeoff::{GenerateTakeoffInput, TakeoffAllocation, UpdateTakeoffStatusInput};
use crate::AppState;

/// Generate (or fetch) the takeoff for a project's current estimate
pub async fn generate_takeoff(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(project_id): Path<Uuid>,
    input: Option<Json<GenerateTakeoffInput>>,
) -> AppResult<Json<MaterialTakeoff>> {
    let input = input.map(|Json(input)| input).unwrap_or_default();
    let takeoff = state
        .takeoff_service()
        .generate(current_user.0.company_id, project_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(takeoff))
}

/// List a project's takeoffs
pub async fn list_takeoffs(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<MaterialTakeoff>>> {
    Ok(Json(state.takeoff_service().list(project_id).await?))
}

/// Get a takeoff by ID
pub async fn get_takeoff(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(takeoff_id): Path<Uuid>,
) -> AppResult<Json<MaterialTakeoff>> {
    Ok(Json(state.takeoff_service().get(takeoff_id).await?))
}

/// Approve, cancel or reopen a takeoff
pub async fn update_takeoff_status(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(takeoff_id): Path<Uuid>,
    Json(input): Json<UpdateTakeoffStatusInput>,
) -> AppResult<Json<MaterialTakeoff>> {
    let takeoff = state
        .takeoff_service()
        .update_status(takeoff_id, input.status)
        .await?;
    Ok(Json(takeoff))
}

/// Draw an approved takeoff's stock from the warehouse
pub async fn allocate_takeoff(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(takeoff_id): Path<Uuid>,
) -> AppResult<Json<TakeoffAllocation>> {
    let allocation = state
        .takeoff_service()
        .allocate(takeoff_id, current_user.0.user_id)
        .await?;
    Ok(Json(allocation))
}

//! HTTP handlers for CSV bulk import and export

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use shared::{ImportSummary, OwnerScope};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::AppState;

fn csv_response(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body)
}

/// Import warehouse levels from a CSV body
pub async fn import_warehouse(
    State(state): State<AppState>,
    current_user: CurrentUser,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let scope = OwnerScope::warehouse(current_user.0.company_id);
    let summary = state
        .csv()
        .import_levels(&scope, &body, current_user.0.user_id)
        .await?;
    Ok(Json(summary))
}

/// Export warehouse levels as CSV
pub async fn export_warehouse(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let scope = OwnerScope::warehouse(current_user.0.company_id);
    Ok(csv_response(state.csv().export_levels(&scope).await?))
}

/// Import a vehicle's levels from a CSV body
pub async fn import_vehicle(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let scope = OwnerScope::vehicle(vehicle_id);
    let summary = state
        .csv()
        .import_levels(&scope, &body, current_user.0.user_id)
        .await?;
    Ok(Json(summary))
}

/// Export a vehicle's levels as CSV
pub async fn export_vehicle(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let scope = OwnerScope::vehicle(vehicle_id);
    Ok(csv_response(state.csv().export_levels(&scope).await?))
}

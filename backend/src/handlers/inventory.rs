//! HTTP handlers for stock levels and the transaction ledger

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{LevelMeta, LevelRecord, NewTransaction, OwnerScope, RestockNeed, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AuthUser, CurrentUser};
use crate::services::transaction_log::Reconciliation;
use crate::AppState;

/// `warehouse` means the caller's own warehouse; otherwise `kind:uuid`
pub(crate) fn resolve_scope(raw: &str, user: &AuthUser) -> AppResult<OwnerScope> {
    match raw.trim() {
        "warehouse" => Ok(OwnerScope::warehouse(user.company_id)),
        other => other
            .parse::<OwnerScope>()
            .map_err(|e| AppError::validation("scope", e.to_string())),
    }
}

/// Input for setting a level
#[derive(Debug, Deserialize)]
pub struct UpsertLevelInput {
    /// Omit to change descriptive fields only
    pub quantity: Option<Decimal>,
    pub min_quantity: Option<Decimal>,
    pub standard_quantity: Option<Decimal>,
    pub location: Option<String>,
    pub last_stock_check: Option<DateTime<Utc>>,
}

impl UpsertLevelInput {
    fn meta(&self) -> LevelMeta {
        LevelMeta {
            min_quantity: self.min_quantity,
            standard_quantity: self.standard_quantity,
            location: self.location.clone(),
            last_stock_check: self.last_stock_check,
        }
    }
}

async fn upsert_level(
    state: &AppState,
    user: &AuthUser,
    scope: OwnerScope,
    material_id: &str,
    input: UpsertLevelInput,
) -> AppResult<LevelRecord> {
    let levels = state.levels();
    match input.quantity {
        Some(quantity) => {
            levels
                .upsert(&scope, material_id, quantity, &input.meta(), user.user_id)
                .await
        }
        None => {
            levels
                .update_meta(&scope, material_id, &input.meta(), user.user_id)
                .await
        }
    }
}

/// List warehouse levels
pub async fn list_warehouse_levels(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<LevelRecord>>> {
    let scope = OwnerScope::warehouse(current_user.0.company_id);
    Ok(Json(state.levels().list(&scope).await?))
}

/// Get one warehouse level
pub async fn get_warehouse_level(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(material_id): Path<String>,
) -> AppResult<Json<LevelRecord>> {
    let scope = OwnerScope::warehouse(current_user.0.company_id);
    Ok(Json(state.levels().require(&scope, &material_id).await?))
}

/// Set a warehouse level (snapshot correction)
pub async fn put_warehouse_level(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(material_id): Path<String>,
    Json(input): Json<UpsertLevelInput>,
) -> AppResult<Json<LevelRecord>> {
    let scope = OwnerScope::warehouse(current_user.0.company_id);
    let level = upsert_level(&state, &current_user.0, scope, &material_id, input).await?;
    Ok(Json(level))
}

/// Record a physical count of a warehouse level
pub async fn check_warehouse_level(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(material_id): Path<String>,
) -> AppResult<Json<LevelRecord>> {
    let scope = OwnerScope::warehouse(current_user.0.company_id);
    let level = state
        .levels()
        .mark_stock_check(&scope, &material_id, current_user.0.user_id)
        .await?;
    Ok(Json(level))
}

/// Warehouse levels at or below their threshold
pub async fn get_low_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<LevelRecord>>> {
    let scope = OwnerScope::warehouse(current_user.0.company_id);
    Ok(Json(state.levels().low_stock(&scope).await?))
}

/// List a vehicle's levels
pub async fn list_vehicle_levels(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<Json<Vec<LevelRecord>>> {
    let scope = OwnerScope::vehicle(vehicle_id);
    Ok(Json(state.levels().list(&scope).await?))
}

/// Get one vehicle level
pub async fn get_vehicle_level(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((vehicle_id, material_id)): Path<(Uuid, String)>,
) -> AppResult<Json<LevelRecord>> {
    let scope = OwnerScope::vehicle(vehicle_id);
    Ok(Json(state.levels().require(&scope, &material_id).await?))
}

/// Set a vehicle level (snapshot correction)
pub async fn put_vehicle_level(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((vehicle_id, material_id)): Path<(Uuid, String)>,
    Json(input): Json<UpsertLevelInput>,
) -> AppResult<Json<LevelRecord>> {
    let scope = OwnerScope::vehicle(vehicle_id);
    let level = upsert_level(&state, &current_user.0, scope, &material_id, input).await?;
    Ok(Json(level))
}

/// Record a physical count of a vehicle level
pub async fn check_vehicle_level(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((vehicle_id, material_id)): Path<(Uuid, String)>,
) -> AppResult<Json<LevelRecord>> {
    let scope = OwnerScope::vehicle(vehicle_id);
    let level = state
        .levels()
        .mark_stock_check(&scope, &material_id, current_user.0.user_id)
        .await?;
    Ok(Json(level))
}

/// What a vehicle needs to reach its standard stock
pub async fn get_vehicle_restock(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<Json<Vec<RestockNeed>>> {
    let scope = OwnerScope::vehicle(vehicle_id);
    Ok(Json(state.levels().restock_needs(&scope).await?))
}

/// Record a ledger entry
pub async fn record_transaction(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<NewTransaction>,
) -> AppResult<Json<Transaction>> {
    let transaction = state.ledger().append(input, current_user.0.user_id).await?;
    Ok(Json(transaction))
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub scope: Option<String>,
    pub material_id: Option<String>,
    pub limit: Option<u32>,
}

/// Transaction history, newest first
pub async fn list_transactions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<Vec<Transaction>>> {
    let ledger = state.ledger();
    let scope = query
        .scope
        .as_deref()
        .map(|raw| resolve_scope(raw, &current_user.0))
        .transpose()?;

    let transactions = match (scope, query.material_id.as_deref()) {
        (Some(scope), Some(material_id)) => ledger.for_key(&scope, material_id, query.limit).await?,
        (Some(scope), None) => ledger.for_scope(&scope, query.limit).await?,
        (None, Some(material_id)) => ledger.for_material(material_id, query.limit).await?,
        (None, None) => {
            return Err(AppError::ValidationError(
                "Provide a scope, a material_id, or both".to_string(),
            ))
        }
    };
    Ok(Json(transactions))
}

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub scope: String,
    pub material_id: String,
}

/// Compare a snapshot with its ledger
pub async fn reconcile(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<KeyQuery>,
) -> AppResult<Json<Reconciliation>> {
    let scope = resolve_scope(&query.scope, &current_user.0)?;
    let report = state.ledger().reconcile(&scope, &query.material_id).await?;
    Ok(Json(report))
}

/// Rewrite a snapshot from its ledger
pub async fn repair(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<KeyQuery>,
) -> AppResult<Json<LevelRecord>> {
    let scope = resolve_scope(&input.scope, &current_user.0)?;
    let level = state
        .ledger()
        .repair(&scope, &input.material_id, current_user.0.user_id)
        .await?;
    Ok(Json(level))
}

//! WebAssembly module for the contractor inventory ledger
//!
//! Provides client-side computation for:
//! - Takeoff previews from an estimate and catalog snapshot
//! - Stock level field validation before upload
//! - Low-stock and restock checks for offline vehicle views
//!
//! Inputs and outputs are JSON strings; decimals travel as strings.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use shared::{
    compute, fingerprint, parse_decimal, parse_quantity, validate_material_id, CatalogSnapshot,
    Estimate, MissingAssemblyPolicy, TakeoffPlan,
};

/// A computed plan and its content hash
#[derive(Debug, Serialize)]
pub struct TakeoffPreview {
    pub plan: TakeoffPlan,
    pub fingerprint: String,
}

fn preview(
    estimate_json: &str,
    catalog_json: &str,
    stock_json: &str,
    skip_missing: bool,
) -> Result<TakeoffPreview, String> {
    let estimate: Estimate =
        serde_json::from_str(estimate_json).map_err(|e| format!("Invalid estimate JSON: {}", e))?;
    let catalog: CatalogSnapshot =
        serde_json::from_str(catalog_json).map_err(|e| format!("Invalid catalog JSON: {}", e))?;
    let stock: BTreeMap<String, Decimal> =
        serde_json::from_str(stock_json).map_err(|e| format!("Invalid stock JSON: {}", e))?;

    let policy = if skip_missing {
        MissingAssemblyPolicy::Skip
    } else {
        MissingAssemblyPolicy::Fail
    };
    let plan = compute(&estimate, &catalog, &stock, policy).map_err(|e| e.to_string())?;
    Ok(TakeoffPreview {
        fingerprint: fingerprint(&plan),
        plan,
    })
}

#[cfg(target_arch = "wasm32")]
fn warn_skipped(plan: &TakeoffPlan) {
    for skipped in &plan.skipped_items {
        web_sys::console::warn_1(&JsValue::from_str(&format!(
            "takeoff preview skipped {} item {} ({}): {}",
            skipped.room, skipped.item, skipped.assembly_id, skipped.reason
        )));
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn warn_skipped(_plan: &TakeoffPlan) {}

/// Compute a takeoff preview; returns `{plan, fingerprint}` as JSON
#[wasm_bindgen]
pub fn preview_takeoff(
    estimate_json: &str,
    catalog_json: &str,
    stock_json: &str,
    skip_missing: bool,
) -> Result<String, JsValue> {
    let preview = preview(estimate_json, catalog_json, stock_json, skip_missing)
        .map_err(|e| JsValue::from_str(&e))?;
    warn_skipped(&preview.plan);
    serde_json::to_string(&preview).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Check a stock quantity cell; returns the normalized value
#[wasm_bindgen]
pub fn check_quantity(raw: &str) -> Result<String, JsValue> {
    parse_quantity(raw)
        .map(|q| q.normalize().to_string())
        .map_err(JsValue::from_str)
}

#[wasm_bindgen]
pub fn is_valid_material_id(material_id: &str) -> bool {
    validate_material_id(material_id).is_ok()
}

/// At or below the threshold counts as low
#[wasm_bindgen]
pub fn is_low_stock(current: &str, min_quantity: &str) -> bool {
    match (parse_decimal(current), parse_decimal(min_quantity)) {
        (Some(current), Some(min)) => current <= min,
        _ => false,
    }
}

/// Quantity needed to reach the standard level, or "0"
#[wasm_bindgen]
pub fn restock_shortfall(current: &str, standard_quantity: &str) -> String {
    match (parse_decimal(current), parse_decimal(standard_quantity)) {
        (Some(current), Some(standard)) if standard > current => standard
            .checked_sub(current)
            .map(|q| q.normalize().to_string())
            .unwrap_or_else(|| "0".to_string()),
        _ => "0".to_string(),
    }
}

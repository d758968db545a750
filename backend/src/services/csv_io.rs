//! Bulk stock-level import and export as CSV
//!
//! Imports are snapshot corrections applied row by row through
//! [`LevelStore::upsert`]; a bad row is reported and the rest still apply.

use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use rust_decimal::Decimal;
use shared::{
    parse_decimal, parse_quantity, validate_quantity_range, ImportSummary, LevelMeta, LevelRecord,
    OwnerScope, ScopeKind,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::level_store::LevelStore;
use crate::store::CatalogSource;

const ID_COLUMNS: &[&str] = &["materialid", "material_id", "id", "sku"];
const QUANTITY_COLUMNS: &[&str] = &["quantity", "currentquantity", "current_quantity"];
const MIN_COLUMNS: &[&str] = &["lowstockthreshold", "low_stock_threshold", "minquantity", "min_quantity"];
const STANDARD_COLUMNS: &[&str] = &["standardquantity", "standard_quantity"];
const LOCATION_COLUMNS: &[&str] = &["location"];

const WAREHOUSE_HEADER: &[&str] = &[
    "materialId",
    "name",
    "category",
    "currentQuantity",
    "location",
    "lowStockThreshold",
    "lastStockCheck",
];

const VEHICLE_HEADER: &[&str] = &[
    "materialId",
    "name",
    "category",
    "currentQuantity",
    "location",
    "minQuantity",
    "standardQuantity",
    "lastStockCheck",
];

/// Column positions resolved from a header row
#[derive(Debug)]
struct Columns {
    id: usize,
    quantity: usize,
    min: Option<(usize, String)>,
    standard: Option<(usize, String)>,
    location: Option<usize>,
}

impl Columns {
    fn resolve(header: &StringRecord) -> AppResult<Self> {
        let find = |aliases: &[&str]| {
            header
                .iter()
                .position(|h| aliases.contains(&h.trim().to_ascii_lowercase().as_str()))
        };
        let named = |aliases: &[&str]| {
            find(aliases).map(|i| (i, header.get(i).unwrap_or_default().trim().to_string()))
        };

        let id = find(ID_COLUMNS).ok_or_else(|| {
            AppError::validation("header", "CSV header needs a materialId, id or sku column")
        })?;
        let quantity = find(QUANTITY_COLUMNS)
            .ok_or_else(|| AppError::validation("header", "CSV header needs a quantity column"))?;

        Ok(Self {
            id,
            quantity,
            min: named(MIN_COLUMNS),
            standard: named(STANDARD_COLUMNS),
            location: find(LOCATION_COLUMNS),
        })
    }
}

fn field(record: &StringRecord, index: usize) -> Option<&str> {
    record.get(index).map(str::trim).filter(|v| !v.is_empty())
}

fn optional_number(record: &StringRecord, column: &Option<(usize, String)>) -> Result<Option<Decimal>, String> {
    let Some((index, name)) = column else {
        return Ok(None);
    };
    match field(record, *index) {
        None => Ok(None),
        Some(raw) => match parse_decimal(raw) {
            Some(value) if value < Decimal::ZERO => Err(format!("{} cannot be negative", name)),
            Some(value) => validate_quantity_range(value)
                .map(|_| Some(value))
                .map_err(|e| format!("{}: {}", name, e)),
            None => Err(format!("{} must be a number", name)),
        },
    }
}

/// One validated data row
struct ImportRow {
    material_id: String,
    quantity: Decimal,
    meta: LevelMeta,
}

fn parse_row(record: &StringRecord, columns: &Columns) -> Result<ImportRow, String> {
    let material_id = field(record, columns.id).ok_or("Material ID is required")?;
    let quantity = parse_quantity(field(record, columns.quantity).unwrap_or_default())?;
    let meta = LevelMeta {
        min_quantity: optional_number(record, &columns.min)?,
        standard_quantity: optional_number(record, &columns.standard)?,
        location: columns
            .location
            .and_then(|i| field(record, i))
            .map(str::to_string),
        last_stock_check: None,
    };

    Ok(ImportRow {
        material_id: material_id.to_string(),
        quantity,
        meta,
    })
}

#[derive(Clone)]
pub struct CsvService {
    levels: LevelStore,
    catalog: Arc<dyn CatalogSource>,
}

impl CsvService {
    pub fn new(levels: LevelStore, catalog: Arc<dyn CatalogSource>) -> Self {
        Self { levels, catalog }
    }

    /// Apply every valid row; rows are numbered from 1, header excluded
    #[tracing::instrument(skip(self, scope, data), fields(scope = %scope, bytes = data.len()))]
    pub async fn import_levels(&self, scope: &OwnerScope, data: &str, actor: Uuid) -> AppResult<ImportSummary> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(data.as_bytes());
        let header = reader.headers()?.clone();
        let columns = Columns::resolve(&header)?;

        let mut summary = ImportSummary::default();
        for (index, result) in reader.records().enumerate() {
            let row = index + 1;
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(row, "unreadable import row: {}", err);
                    summary.record_failure(row, err.to_string());
                    continue;
                }
            };

            let parsed = match parse_row(&record, &columns) {
                Ok(parsed) => parsed,
                Err(message) => {
                    tracing::warn!(row, "import row rejected: {}", message);
                    summary.record_failure(row, message);
                    continue;
                }
            };

            match self
                .levels
                .upsert(scope, &parsed.material_id, parsed.quantity, &parsed.meta, actor)
                .await
            {
                Ok(_) => summary.record_success(),
                Err(err) => {
                    tracing::warn!(row, material_id = %parsed.material_id, "import row failed: {}", err);
                    summary.record_failure(row, err.to_string());
                }
            }
        }

        tracing::info!(
            total = summary.total_rows,
            succeeded = summary.success_rows,
            failed = summary.failed_rows,
            "stock import finished"
        );
        Ok(summary)
    }

    /// Current levels of a scope with catalog names
    pub async fn export_levels(&self, scope: &OwnerScope) -> AppResult<String> {
        let levels = self.levels.list(scope).await?;
        let vehicle = scope.kind() == ScopeKind::Vehicle;

        let mut wtr = Writer::from_writer(vec![]);
        wtr.write_record(if vehicle { VEHICLE_HEADER } else { WAREHOUSE_HEADER })?;

        for level in &levels {
            let material = self.catalog.get_material(&level.material_id).await?;
            let (name, category) = material
                .map(|m| (m.name, m.category.unwrap_or_default()))
                .unwrap_or_default();
            wtr.write_record(export_row(level, name, category, vehicle))?;
        }

        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

fn decimal_cell(value: Option<Decimal>) -> String {
    value.map(|v| v.normalize().to_string()).unwrap_or_default()
}

fn export_row(level: &LevelRecord, name: String, category: String, vehicle: bool) -> Vec<String> {
    let mut row = vec![
        level.material_id.clone(),
        name,
        category,
        level.current_quantity.normalize().to_string(),
        level.location.clone().unwrap_or_default(),
        decimal_cell(level.min_quantity),
    ];
    if vehicle {
        row.push(decimal_cell(level.standard_quantity));
    }
    row.push(
        level
            .last_stock_check
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
    );
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    #[test]
    fn header_aliases_are_case_insensitive() {
        let columns = Columns::resolve(&record(&[" SKU ", "Name", "Quantity", "MinQuantity"])).unwrap();
        assert_eq!(columns.id, 0);
        assert_eq!(columns.quantity, 2);
        assert_eq!(columns.min.as_ref().map(|(i, _)| *i), Some(3));
        assert!(columns.location.is_none());
    }

    #[test]
    fn header_without_quantity_is_rejected() {
        let err = Columns::resolve(&record(&["materialId", "name"])).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn row_messages() {
        let columns =
            Columns::resolve(&record(&["materialId", "quantity", "lowStockThreshold"])).unwrap();

        let missing_id = parse_row(&record(&["", "3", ""]), &columns).err();
        assert_eq!(missing_id.as_deref(), Some("Material ID is required"));

        let bad_qty = parse_row(&record(&["M1", "abc", ""]), &columns).err();
        assert_eq!(bad_qty.as_deref(), Some("Quantity must be a number"));

        let bad_min = parse_row(&record(&["M1", "3", "lots"]), &columns).err();
        assert_eq!(bad_min.as_deref(), Some("lowStockThreshold must be a number"));

        let short_row = parse_row(&record(&["M1"]), &columns).err();
        assert_eq!(short_row.as_deref(), Some("Quantity is required"));
    }
}

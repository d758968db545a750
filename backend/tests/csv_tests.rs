//! Bulk CSV import/export tests
//!
//! Covers:
//! - Partial-failure imports with 1-based row errors
//! - Header aliases and required columns
//! - Export layout per scope kind, including quoting

mod common;

use common::{dec, Harness};
use inventory_ledger::error::AppError;
use inventory_ledger::services::CsvService;
use shared::{LevelMeta, Material, OwnerScope, RowError};
use uuid::Uuid;

fn csv_service(h: &Harness) -> CsvService {
    CsvService::new(h.levels.clone(), h.store.clone())
}

// ============================================================================
// Import Tests
// ============================================================================

#[cfg(test)]
mod import_tests {
    use super::*;

    #[tokio::test]
    async fn test_bad_row_is_reported_and_rest_apply() {
        let h = Harness::new();
        let csv = csv_service(&h);
        let warehouse = OwnerScope::warehouse(Uuid::new_v4());

        let data = "materialId,name,quantity,location\n\
                    M1,Wire,10,Bay 1\n\
                    M2,Box,5,Bay 2\n\
                    M3,Breaker,abc,Bay 3\n\
                    M4,Conduit,7.5,\n\
                    M5,Strap,0,Bay 5\n";
        let summary = csv.import_levels(&warehouse, data, h.actor).await.unwrap();

        assert_eq!(summary.total_rows, 5);
        assert_eq!(summary.success_rows, 4);
        assert_eq!(summary.failed_rows, 1);
        assert_eq!(
            summary.errors,
            vec![RowError {
                row: 3,
                message: "Quantity must be a number".to_string(),
            }]
        );

        assert_eq!(h.quantity(warehouse, "M4").await, dec("7.5"));
        assert!(h.levels.get(&warehouse, "M3").await.unwrap().is_none());
        let m1 = h.levels.get(&warehouse, "M1").await.unwrap().unwrap();
        assert_eq!(m1.location.as_deref(), Some("Bay 1"));
    }

    #[tokio::test]
    async fn test_row_level_messages() {
        let h = Harness::new();
        let csv = csv_service(&h);
        let vehicle = OwnerScope::vehicle(Uuid::new_v4());

        let data = "sku,qty_ignored,Quantity,MinQuantity,StandardQuantity\n\
                    ,x,1,,\n\
                    M2,x,-4,,\n\
                    M3,x,2,-1,\n\
                    M4,x,2,1,lots\n\
                    M5,x,,1,\n";
        let summary = csv.import_levels(&vehicle, data, h.actor).await.unwrap();

        let messages: Vec<(usize, &str)> = summary
            .errors
            .iter()
            .map(|e| (e.row, e.message.as_str()))
            .collect();
        assert_eq!(
            messages,
            vec![
                (1, "Material ID is required"),
                (2, "Quantity cannot be negative"),
                (3, "MinQuantity cannot be negative"),
                (4, "StandardQuantity must be a number"),
                (5, "Quantity is required"),
            ]
        );
        assert_eq!(summary.success_rows, 0);
    }

    #[tokio::test]
    async fn test_values_beyond_stored_precision_are_row_errors() {
        let h = Harness::new();
        let csv = csv_service(&h);
        let warehouse = OwnerScope::warehouse(Uuid::new_v4());

        let data = "materialId,quantity,minQuantity\n\
                    M1,0.00004,\n\
                    M2,100000000000000,\n\
                    M3,5,0.12345\n\
                    M4,12.5000,2\n";
        let summary = csv.import_levels(&warehouse, data, h.actor).await.unwrap();

        let messages: Vec<(usize, &str)> = summary
            .errors
            .iter()
            .map(|e| (e.row, e.message.as_str()))
            .collect();
        assert_eq!(
            messages,
            vec![
                (1, "Quantity cannot have more than 4 decimal places"),
                (2, "Quantity cannot exceed 14 integer digits"),
                (3, "minQuantity: Quantity cannot have more than 4 decimal places"),
            ]
        );
        assert_eq!(summary.success_rows, 1);
        assert_eq!(h.quantity(warehouse, "M4").await, dec("12.5"));
    }

    #[tokio::test]
    async fn test_header_without_id_column_is_rejected() {
        let h = Harness::new();
        let csv = csv_service(&h);
        let warehouse = OwnerScope::warehouse(Uuid::new_v4());

        let err = csv
            .import_levels(&warehouse, "name,quantity\nWire,10\n", h.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "header"));
        assert!(h.levels.list(&warehouse).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_resets_ledger_baseline() {
        let h = Harness::new();
        let csv = csv_service(&h);
        let warehouse = OwnerScope::warehouse(Uuid::new_v4());
        h.purchase(warehouse, "M1", "40").await;

        let summary = csv
            .import_levels(
                &warehouse,
                "id,current_quantity,low_stock_threshold\nM1,33,10\n",
                h.actor,
            )
            .await
            .unwrap();
        assert_eq!(summary.success_rows, 1);

        let level = h.levels.get(&warehouse, "M1").await.unwrap().unwrap();
        assert_eq!(level.current_quantity, dec("33"));
        assert_eq!(level.min_quantity, Some(dec("10")));
        h.assert_consistent(warehouse, "M1").await;
    }
}

// ============================================================================
// Export Tests
// ============================================================================

#[cfg(test)]
mod export_tests {
    use super::*;

    #[tokio::test]
    async fn test_warehouse_export_quotes_names() {
        let h = Harness::new();
        let csv = csv_service(&h);
        let warehouse = OwnerScope::warehouse(Uuid::new_v4());
        h.store
            .insert_material(Material {
                id: "WIRE-12".to_string(),
                name: "Wire, 12 AWG".to_string(),
                unit_cost: dec("0.42"),
                default_waste_factor: None,
                category: Some("wire".to_string()),
            })
            .await;
        let meta = LevelMeta {
            min_quantity: Some(dec("100")),
            location: Some("Rack A".to_string()),
            ..Default::default()
        };
        h.levels
            .upsert(&warehouse, "WIRE-12", dec("500.50"), &meta, h.actor)
            .await
            .unwrap();
        h.levels
            .upsert(&warehouse, "ZZ-UNKNOWN", dec("1"), &LevelMeta::default(), h.actor)
            .await
            .unwrap();

        let out = csv.export_levels(&warehouse).await.unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[0],
            "materialId,name,category,currentQuantity,location,lowStockThreshold,lastStockCheck"
        );
        assert_eq!(lines[1], "WIRE-12,\"Wire, 12 AWG\",wire,500.5,Rack A,100,");
        assert_eq!(lines[2], "ZZ-UNKNOWN,,,1,,,");
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_vehicle_export_has_standard_quantity() {
        let h = Harness::new();
        let csv = csv_service(&h);
        let vehicle = OwnerScope::vehicle(Uuid::new_v4());
        let meta = LevelMeta {
            min_quantity: Some(dec("2")),
            standard_quantity: Some(dec("6")),
            ..Default::default()
        };
        h.levels
            .upsert(&vehicle, "M1", dec("4"), &meta, h.actor)
            .await
            .unwrap();

        let out = csv.export_levels(&vehicle).await.unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("materialId,name,category,currentQuantity,location,minQuantity,standardQuantity,lastStockCheck")
        );
        assert_eq!(lines.next(), Some("M1,,,4,,2,6,"));
    }

    #[tokio::test]
    async fn test_export_reimports_cleanly() {
        let h = Harness::new();
        let csv = csv_service(&h);
        let vehicle = OwnerScope::vehicle(Uuid::new_v4());
        h.purchase(vehicle, "M1", "3").await;
        h.purchase(vehicle, "M2", "8").await;

        let exported = csv.export_levels(&vehicle).await.unwrap();
        let other = OwnerScope::vehicle(Uuid::new_v4());
        let summary = csv.import_levels(&other, &exported, h.actor).await.unwrap();

        assert_eq!(summary.success_rows, 2);
        assert_eq!(h.quantity(other, "M2").await, dec("8"));
    }
}

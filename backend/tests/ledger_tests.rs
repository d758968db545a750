//! Transaction log tests
//!
//! Covers:
//! - Ledger consistency: snapshot == baseline + effects of later entries
//! - Non-negativity: failing appends write nothing
//! - Adjustment modes, idempotent retries, CAS under concurrency
//! - Replay, reconcile and repair

mod common;

use std::sync::Arc;

use common::{dec, Harness};
use inventory_ledger::config::LedgerConfig;
use inventory_ledger::error::AppError;
use inventory_ledger::services::TransactionLog;
use inventory_ledger::store::{InventoryStore, MemoryStore, RetryPolicy, RetryingStore};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{AdjustmentMode, LevelMeta, NewTransaction, OwnerScope, TransactionType};
use uuid::Uuid;

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[tokio::test]
    async fn test_effects_per_type() {
        let h = Harness::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());

        h.purchase(scope, "M1", "50").await;
        h.log
            .append(NewTransaction::new(scope, "M1", TransactionType::Allocation, dec("20")), h.actor)
            .await
            .unwrap();
        h.log
            .append(NewTransaction::new(scope, "M1", TransactionType::Return, dec("5")), h.actor)
            .await
            .unwrap();

        assert_eq!(h.quantity(scope, "M1").await, dec("35"));
        h.assert_consistent(scope, "M1").await;
    }

    #[tokio::test]
    async fn test_overdraw_fails_without_side_effects() {
        let h = Harness::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());
        h.purchase(scope, "M1", "10").await;

        let err = h
            .log
            .append(NewTransaction::new(scope, "M1", TransactionType::Allocation, dec("10.5")), h.actor)
            .await
            .unwrap_err();
        match err {
            AppError::InsufficientStock { requested, available, .. } => {
                assert_eq!(requested, dec("10.5"));
                assert_eq!(available, dec("10"));
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }

        assert_eq!(h.quantity(scope, "M1").await, dec("10"));
        assert_eq!(h.log.for_scope(&scope, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_and_negative_quantities_rejected() {
        let h = Harness::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());

        for qty in ["0", "-3"] {
            let err = h
                .log
                .append(NewTransaction::new(scope, "M1", TransactionType::Purchase, dec(qty)), h.actor)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));
        }
        assert!(h.levels.get(&scope, "M1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_quantities_rejected() {
        let h = Harness::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());

        let huge = Decimal::from_scientific("5e28").unwrap();
        for qty in [huge, dec("0.00004")] {
            let err = h
                .log
                .append(NewTransaction::new(scope, "M1", TransactionType::Purchase, qty), h.actor)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));
        }
        assert!(h.levels.get(&scope, "M1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_level_cannot_grow_past_stored_range() {
        let h = Harness::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());
        h.purchase(scope, "M1", "99999999999999").await;

        let err = h
            .log
            .append(NewTransaction::new(scope, "M1", TransactionType::Purchase, dec("1")), h.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));

        assert_eq!(h.quantity(scope, "M1").await, dec("99999999999999"));
        assert_eq!(h.log.for_scope(&scope, None).await.unwrap().len(), 1);
        h.assert_consistent(scope, "M1").await;
    }

    #[tokio::test]
    async fn test_delta_adjustment_is_signed() {
        let h = Harness::new();
        let scope = OwnerScope::vehicle(Uuid::new_v4());
        h.purchase(scope, "M1", "8").await;

        let down = h
            .log
            .append(NewTransaction::new(scope, "M1", TransactionType::Adjustment, dec("-3")), h.actor)
            .await
            .unwrap();
        assert_eq!(down.adjustment_mode, Some(AdjustmentMode::Delta));
        assert_eq!(h.quantity(scope, "M1").await, dec("5"));

        let err = h
            .log
            .append(NewTransaction::new(scope, "M1", TransactionType::Adjustment, dec("-6")), h.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { .. }));
        h.assert_consistent(scope, "M1").await;
    }

    #[tokio::test]
    async fn test_absolute_adjustment_sets_count() {
        let h = Harness::with_config(LedgerConfig {
            adjustment_mode: AdjustmentMode::Absolute,
            ..Default::default()
        });
        let scope = OwnerScope::vehicle(Uuid::new_v4());
        h.purchase(scope, "M1", "8").await;

        h.log
            .append(NewTransaction::new(scope, "M1", TransactionType::Adjustment, dec("3")), h.actor)
            .await
            .unwrap();
        h.purchase(scope, "M1", "2").await;

        assert_eq!(h.quantity(scope, "M1").await, dec("5"));
        assert_eq!(h.log.replay(&scope, "M1").await.unwrap(), dec("5"));
    }

    #[tokio::test]
    async fn test_transfer_entry_requires_counterparty() {
        let h = Harness::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());

        let mut leg = NewTransaction::new(scope, "M1", TransactionType::Transfer, dec("1"));
        leg.direction = Some(shared::TransferDirection::Incoming);
        let err = h.log.append(leg, h.actor).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "counterparty_scope"));
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_limited() {
        let h = Harness::new();
        let warehouse = OwnerScope::warehouse(Uuid::new_v4());
        let vehicle = OwnerScope::vehicle(Uuid::new_v4());

        for qty in ["1", "2", "3"] {
            h.purchase(warehouse, "M1", qty).await;
        }
        h.purchase(vehicle, "M1", "4").await;
        h.purchase(warehouse, "M2", "5").await;

        let by_material = h.log.for_material("M1", None).await.unwrap();
        assert_eq!(by_material.len(), 4);
        assert_eq!(by_material[0].quantity, dec("4"));

        let by_scope = h.log.for_scope(&warehouse, Some(2)).await.unwrap();
        assert_eq!(by_scope.len(), 2);
        assert_eq!(by_scope[0].material_id, "M2");
        assert_eq!(by_scope[1].quantity, dec("3"));

        let by_key = h.log.for_key(&warehouse, "M1", None).await.unwrap();
        let versions: Vec<i64> = by_key.iter().map(|t| t.level_version).collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_snapshot_correction_starts_new_baseline() {
        let h = Harness::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());
        h.purchase(scope, "M1", "10").await;

        // a physical count finds 7
        h.levels
            .upsert(&scope, "M1", dec("7"), &LevelMeta::default(), h.actor)
            .await
            .unwrap();
        h.log
            .append(NewTransaction::new(scope, "M1", TransactionType::Allocation, dec("2")), h.actor)
            .await
            .unwrap();

        let report = h.log.verify(&scope, "M1").await.unwrap();
        assert_eq!(report.ledger_quantity, dec("5"));
        assert_eq!(report.entries_since_baseline, 1);
    }

    #[tokio::test]
    async fn test_repair_rewrites_divergent_snapshot() {
        let h = Harness::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());
        h.purchase(scope, "M1", "40").await;
        h.purchase(scope, "M1", "2").await;

        assert!(h.store.overwrite_level_unchecked(&scope, "M1", dec("39")).await);
        let report = h.log.reconcile(&scope, "M1").await.unwrap();
        assert!(!report.consistent);
        assert!(matches!(
            h.log.verify(&scope, "M1").await,
            Err(AppError::IntegrityViolation(_))
        ));

        let repaired = h.log.repair(&scope, "M1", h.actor).await.unwrap();
        assert_eq!(repaired.current_quantity, dec("42"));
        h.assert_consistent(scope, "M1").await;

        // later entries build on the repaired snapshot
        h.purchase(scope, "M1", "1").await;
        assert_eq!(h.quantity(scope, "M1").await, dec("43"));
        h.assert_consistent(scope, "M1").await;
    }

    #[tokio::test]
    async fn test_reconcile_unknown_key_is_not_found() {
        let h = Harness::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());
        assert!(matches!(
            h.log.reconcile(&scope, "NOPE").await,
            Err(AppError::NotFound(_))
        ));
    }
}

// ============================================================================
// Persistence Boundary Tests
// ============================================================================

#[cfg(test)]
mod persistence_tests {
    use super::*;

    fn retrying_log(inner: Arc<MemoryStore>, attempts: u32) -> TransactionLog {
        let store: Arc<dyn InventoryStore> =
            Arc::new(RetryingStore::new(inner, RetryPolicy::immediate(attempts)));
        TransactionLog::new(store, &LedgerConfig::default())
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let inner = Arc::new(MemoryStore::new());
        let log = retrying_log(inner.clone(), 4);
        let scope = OwnerScope::warehouse(Uuid::new_v4());

        inner.inject_transient_failures(3).await;
        let tx = log
            .append(NewTransaction::new(scope, "M1", TransactionType::Purchase, dec("6")), Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(tx.level_version, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_unavailable() {
        let inner = Arc::new(MemoryStore::new());
        let log = retrying_log(inner.clone(), 2);
        let scope = OwnerScope::warehouse(Uuid::new_v4());

        inner.inject_commit_failures(scope, 5).await;
        let err = log
            .append(NewTransaction::new(scope, "M1", TransactionType::Purchase, dec("6")), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));

        inner.clear_faults().await;
        assert!(inner.get_level(&scope, "M1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_lose_no_updates() {
        let h = Harness::with_config(LedgerConfig {
            max_cas_retries: 64,
            ..Default::default()
        });
        let scope = OwnerScope::warehouse(Uuid::new_v4());
        h.purchase(scope, "M1", "100").await;

        let mut tasks = Vec::new();
        for i in 0..24 {
            let log = h.log.clone();
            let actor = h.actor;
            tasks.push(tokio::spawn(async move {
                let kind = if i % 2 == 0 {
                    TransactionType::Purchase
                } else {
                    TransactionType::Allocation
                };
                log.append(NewTransaction::new(scope, "M1", kind, dec("3")), actor)
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(h.quantity(scope, "M1").await, dec("100"));
        let history = h.log.for_key(&scope, "M1", Some(1000)).await.unwrap();
        assert_eq!(history.len(), 25);
        h.assert_consistent(scope, "M1").await;
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    #[derive(Debug, Clone)]
    enum Op {
        Purchase(Decimal),
        Allocate(Decimal),
        Return(Decimal),
        Adjust(Decimal),
        Recount(Decimal),
    }

    /// Strategy for generating valid quantities (positive decimals)
    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=5000i64).prop_map(|n| Decimal::new(n, 1)) // 0.1 to 500.0
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            quantity_strategy().prop_map(Op::Purchase),
            quantity_strategy().prop_map(Op::Allocate),
            quantity_strategy().prop_map(Op::Return),
            (quantity_strategy(), any::<bool>())
                .prop_map(|(q, up)| Op::Adjust(if up { q } else { -q })),
            quantity_strategy().prop_map(Op::Recount),
        ]
    }

    /// Apply `ops` through the services; returns (model, snapshot, consistent, min seen)
    async fn run(ops: Vec<Op>) -> (Decimal, Decimal, bool, Decimal) {
        let h = Harness::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());
        let mut model = Decimal::ZERO;
        let mut lowest = Decimal::MAX;

        for op in ops {
            let (new, next) = match op {
                Op::Recount(q) => {
                    h.levels
                        .upsert(&scope, "M1", q, &LevelMeta::default(), h.actor)
                        .await
                        .unwrap();
                    model = q;
                    continue;
                }
                Op::Purchase(q) => (NewTransaction::new(scope, "M1", TransactionType::Purchase, q), model + q),
                Op::Allocate(q) => (NewTransaction::new(scope, "M1", TransactionType::Allocation, q), model - q),
                Op::Return(q) => (NewTransaction::new(scope, "M1", TransactionType::Return, q), model + q),
                Op::Adjust(q) => (NewTransaction::new(scope, "M1", TransactionType::Adjustment, q), model + q),
            };

            match h.log.append(new, h.actor).await {
                Ok(_) => model = next,
                Err(AppError::InsufficientStock { .. }) => assert!(next < Decimal::ZERO),
                Err(other) => panic!("unexpected error {:?}", other),
            }
            let current = h.quantity(scope, "M1").await;
            lowest = lowest.min(current);
        }

        let snapshot = h.quantity(scope, "M1").await;
        let consistent = match h.levels.get(&scope, "M1").await.unwrap() {
            Some(_) => h.log.reconcile(&scope, "M1").await.unwrap().consistent,
            None => true,
        };
        (model, snapshot, consistent, lowest)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Snapshot always equals the replayed ledger and the reference model
        #[test]
        fn prop_ledger_consistency(ops in prop::collection::vec(op_strategy(), 1..25)) {
            let (model, snapshot, consistent, lowest) = tokio_test::block_on(run(ops));

            prop_assert!(consistent);
            prop_assert_eq!(snapshot, model);
            prop_assert!(lowest >= Decimal::ZERO);
        }
    }
}

//! Shared fixtures for backend integration tests

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use inventory_ledger::config::LedgerConfig;
use inventory_ledger::services::{LevelStore, TransactionLog, TransferCoordinator};
use inventory_ledger::store::MemoryStore;
use rust_decimal::Decimal;
use shared::{NewTransaction, OwnerScope, TransactionType};
use uuid::Uuid;

// Helper to create Decimal from string
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Services over one in-process store
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub log: TransactionLog,
    pub levels: LevelStore,
    pub transfers: TransferCoordinator,
    pub actor: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let log = TransactionLog::new(store.clone(), &config);
        Self {
            levels: LevelStore::new(store.clone(), config.max_cas_retries),
            transfers: TransferCoordinator::new(log.clone()),
            log,
            store,
            actor: Uuid::new_v4(),
        }
    }

    /// Stock a key through the ledger
    pub async fn purchase(&self, scope: OwnerScope, material_id: &str, quantity: &str) {
        self.log
            .append(
                NewTransaction::new(scope, material_id, TransactionType::Purchase, dec(quantity)),
                self.actor,
            )
            .await
            .unwrap();
    }

    pub async fn quantity(&self, scope: OwnerScope, material_id: &str) -> Decimal {
        self.levels
            .get(&scope, material_id)
            .await
            .unwrap()
            .map(|l| l.current_quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn assert_consistent(&self, scope: OwnerScope, material_id: &str) {
        let report = self.log.reconcile(&scope, material_id).await.unwrap();
        assert!(
            report.consistent,
            "{} at {}: snapshot {} ledger {}",
            material_id, scope, report.snapshot_quantity, report.ledger_quantity
        );
    }
}

//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Default page size for transaction history
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

/// Hard cap on transaction history page size
pub const MAX_HISTORY_LIMIT: u32 = 1000;

/// Clamp a caller-supplied history limit into `1..=max`
pub fn clamp_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, max.max(1))
}

/// A per-row failure in a bulk import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based data row number, header excluded
    pub row: usize,
    pub message: String,
}

/// Outcome of a bulk import with partial-failure semantics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_rows: usize,
    pub success_rows: usize,
    pub failed_rows: usize,
    pub errors: Vec<RowError>,
}

impl ImportSummary {
    pub fn record_success(&mut self) {
        self.total_rows += 1;
        self.success_rows += 1;
    }

    pub fn record_failure(&mut self, row: usize, message: impl Into<String>) {
        self.total_rows += 1;
        self.failed_rows += 1;
        self.errors.push(RowError {
            row,
            message: message.into(),
        });
    }
}

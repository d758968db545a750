//! Error handling for the inventory ledger API
//!
//! Every failure leaves the server as `{"error": {"code", "message", "field?"}}`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{AllocationError, LedgerError};
use thiserror::Error;

use crate::store::StoreError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Insufficient stock of {material_id}: requested {requested}, available {available}")]
    InsufficientStock {
        material_id: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Ledger and snapshot disagree, or a compensation could not be recorded
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    // Persistence errors
    #[error("Storage unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("CSV error: {0}")]
    Csv(String),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::Conflict(_) => "CONFLICT",
            AppError::IntegrityViolation(_) => "INTEGRITY_VIOLATION",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::Csv(_) => "CSV_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation { .. } | AppError::ValidationError(_) | AppError::Csv(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientStock { .. } | AppError::InvalidStateTransition(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::IntegrityViolation(_) | AppError::Persistence(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                field: None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let field = match &self {
            AppError::Validation { field, .. } => Some(field.clone()),
            AppError::InsufficientStock { .. } => Some("quantity".to_string()),
            _ => None,
        };
        let message = match &self {
            AppError::Validation { message, .. } => message.clone(),
            AppError::NotFound(resource) => format!("{} not found", resource),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            err @ StoreError::VersionConflict { .. } => AppError::Conflict(err.to_string()),
            err @ StoreError::DuplicateTakeoff(_) => AppError::Conflict(err.to_string()),
            other => AppError::Persistence(other.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Invalid { field, message } => AppError::validation(field, message),
        }
    }
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::InvalidEstimate(msg) | AllocationError::InvalidCatalog(msg) => {
                AppError::ValidationError(msg)
            }
            err @ (AllocationError::AssemblyNotFound { .. }
            | AllocationError::MaterialNotFound { .. }) => AppError::NotFound(err.to_string()),
            err @ AllocationError::QuantityOverflow(_) => {
                AppError::validation("quantity", err.to_string())
            }
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Csv(err.to_string())
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

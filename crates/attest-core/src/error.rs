// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for attest-core.
//!
//! Provides a unified error type covering the whole check-in lifecycle:
//! missing entities, guarded state transitions, input validation, upstream
//! gateway failures, and database errors.

use std::fmt;

use chrono::NaiveDate;
use uuid::Uuid;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during check-in processing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Offender was not found in the database.
    OffenderNotFound {
        /// The offender ID that was not found.
        offender_id: Uuid,
    },

    /// Check-in was not found in the database.
    CheckinNotFound {
        /// The check-in ID that was not found.
        checkin_id: Uuid,
    },

    /// A check-in already exists for this offender and due date.
    CheckinAlreadyExists {
        /// The offender ID.
        offender_id: Uuid,
        /// The duplicated due date.
        due_date: NaiveDate,
    },

    /// Check-in is in an invalid state for the requested operation.
    InvalidCheckinState {
        /// The check-in ID.
        checkin_id: Uuid,
        /// The expected status.
        expected: String,
        /// The actual status.
        actual: String,
    },

    /// Offender is in an invalid state for the requested operation.
    InvalidOffenderState {
        /// The offender ID.
        offender_id: Uuid,
        /// The expected status.
        expected: String,
        /// The actual status.
        actual: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// An upstream gateway failed after retries or with an open breaker.
    Upstream {
        /// The gateway that failed.
        service: String,
        /// Error details.
        details: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::OffenderNotFound { .. } => "OFFENDER_NOT_FOUND",
            Self::CheckinNotFound { .. } => "CHECKIN_NOT_FOUND",
            Self::CheckinAlreadyExists { .. } => "CHECKIN_ALREADY_EXISTS",
            Self::InvalidCheckinState { .. } => "INVALID_CHECKIN_STATE",
            Self::InvalidOffenderState { .. } => "INVALID_OFFENDER_STATE",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::Upstream { .. } => "UPSTREAM_UNAVAILABLE",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Whether this error maps to a client-visible 404 equivalent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::OffenderNotFound { .. } | Self::CheckinNotFound { .. }
        )
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OffenderNotFound { offender_id } => {
                write!(f, "Offender '{}' not found", offender_id)
            }
            Self::CheckinNotFound { checkin_id } => {
                write!(f, "Check-in '{}' not found", checkin_id)
            }
            Self::CheckinAlreadyExists {
                offender_id,
                due_date,
            } => {
                write!(
                    f,
                    "Check-in for offender '{}' due {} already exists",
                    offender_id, due_date
                )
            }
            Self::InvalidCheckinState {
                checkin_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Check-in '{}' is in invalid state: expected '{}', got '{}'",
                    checkin_id, expected, actual
                )
            }
            Self::InvalidOffenderState {
                offender_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Offender '{}' is in invalid state: expected '{}', got '{}'",
                    offender_id, expected, actual
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::Upstream { service, details } => {
                write!(f, "Upstream '{}' unavailable: {}", service, details)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<crate::gateways::GatewayError> for CoreError {
    fn from(err: crate::gateways::GatewayError) -> Self {
        CoreError::Upstream {
            service: err.service().to_string(),
            details: err.to_string(),
        }
    }
}

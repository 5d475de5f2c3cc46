// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for attest-scheduler.

use thiserror::Error;

/// Scheduler errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Core operation failed.
    #[error("Core error: {0}")]
    Core(#[from] attest_core::error::CoreError),

    /// Gateway call failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] attest_core::gateways::GatewayError),

    /// A cron expression could not be parsed.
    #[error("Invalid cron expression '{expression}': {details}")]
    InvalidCron {
        /// The offending expression.
        expression: String,
        /// Parser detail.
        details: String,
    },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using scheduler Error.
pub type Result<T> = std::result::Result<T, Error>;

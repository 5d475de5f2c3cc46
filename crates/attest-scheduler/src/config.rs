// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for attest-scheduler.

use std::time::Duration;

/// Scheduler configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL shared with attest-core.
    pub database_url: String,

    /// Cron expression for the creation worker.
    pub creation_cron: String,
    /// Cron expression for the expiry worker.
    pub expiry_cron: String,
    /// Cron expression for the reminder worker.
    pub reminder_cron: String,
    /// Cron expression for both status reconciliation workers.
    pub status_cron: String,

    /// Minimum lease hold after release.
    pub lock_min_hold: Duration,
    /// Maximum lease hold before expiry.
    pub lock_max_hold: Duration,

    /// Days after the due date before a created check-in expires.
    pub grace_period_days: i64,
    /// Day inside the grace window on which reminders fire (1 = day after due).
    pub reminder_day_offset: i64,
    /// Lookback window for notification status reconciliation.
    pub status_lookback: Duration,

    /// Similarity threshold handed to the facial verification provider.
    pub face_similarity_threshold: f32,
    /// TTL for presigned upload/download URLs.
    pub upload_url_ttl: Duration,

    /// Offender SMS channel enabled.
    pub offender_sms_enabled: bool,
    /// Offender email channel enabled.
    pub offender_email_enabled: bool,
    /// Practitioner email channel enabled.
    pub practitioner_email_enabled: bool,
    /// Notification provider requests-per-minute ceiling.
    pub notify_requests_per_minute: u32,

    /// Case directory API base URL.
    pub case_directory_url: String,
    /// Case directory API key.
    pub case_directory_api_key: String,
    /// Notification provider base URL.
    pub notify_url: String,
    /// Notification provider API key.
    pub notify_api_key: String,
    /// Facial verification base URL.
    pub face_url: String,
    /// Facial verification API key.
    pub face_api_key: String,
    /// Object storage gateway base URL.
    pub object_store_url: String,
    /// Object storage gateway API key.
    pub object_store_api_key: String,
    /// Endpoint domain events are posted to.
    pub events_endpoint: String,
    /// Base URL for event detail links.
    pub detail_base_url: String,

    /// Per-call timeout for every outbound client.
    pub client_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("ATTEST_DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("ATTEST_DATABASE_URL"))?;

        Ok(Self {
            database_url,
            creation_cron: var_or("ATTEST_CREATION_CRON", "0 6 * * *"),
            expiry_cron: var_or("ATTEST_EXPIRY_CRON", "30 6 * * *"),
            reminder_cron: var_or("ATTEST_REMINDER_CRON", "0 9 * * *"),
            status_cron: var_or("ATTEST_STATUS_CRON", "*/15 * * * *"),
            lock_min_hold: Duration::from_secs(parse_var("ATTEST_LOCK_MIN_HOLD_SECS", 30)?),
            lock_max_hold: Duration::from_secs(parse_var("ATTEST_LOCK_MAX_HOLD_SECS", 900)?),
            grace_period_days: parse_var("ATTEST_GRACE_PERIOD_DAYS", 3)?,
            reminder_day_offset: parse_var("ATTEST_REMINDER_DAY_OFFSET", 1)?,
            status_lookback: Duration::from_secs(
                parse_var("ATTEST_STATUS_LOOKBACK_HOURS", 72u64)? * 3600,
            ),
            face_similarity_threshold: parse_var("ATTEST_FACE_SIMILARITY_THRESHOLD", 90.0f32)?,
            upload_url_ttl: Duration::from_secs(parse_var("ATTEST_UPLOAD_URL_TTL_SECS", 900)?),
            offender_sms_enabled: flag_or("ATTEST_OFFENDER_SMS_ENABLED", true),
            offender_email_enabled: flag_or("ATTEST_OFFENDER_EMAIL_ENABLED", true),
            practitioner_email_enabled: flag_or("ATTEST_PRACTITIONER_EMAIL_ENABLED", true),
            notify_requests_per_minute: parse_var("ATTEST_NOTIFY_RPM", 3000)?,
            case_directory_url: var_or("ATTEST_CASE_DIRECTORY_URL", "http://localhost:9090"),
            case_directory_api_key: var_or("ATTEST_CASE_DIRECTORY_API_KEY", ""),
            notify_url: var_or("ATTEST_NOTIFY_URL", "http://localhost:9091"),
            notify_api_key: var_or("ATTEST_NOTIFY_API_KEY", ""),
            face_url: var_or("ATTEST_FACE_URL", "http://localhost:9092"),
            face_api_key: var_or("ATTEST_FACE_API_KEY", ""),
            object_store_url: var_or("ATTEST_OBJECT_STORE_URL", "http://localhost:9093"),
            object_store_api_key: var_or("ATTEST_OBJECT_STORE_API_KEY", ""),
            events_endpoint: var_or("ATTEST_EVENTS_ENDPOINT", "http://localhost:9094/events"),
            detail_base_url: var_or("ATTEST_DETAIL_BASE_URL", "http://localhost:8080"),
            client_timeout: Duration::from_secs(parse_var("ATTEST_CLIENT_TIMEOUT_SECS", 10)?),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn flag_or(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// An environment variable holds an unparseable value.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

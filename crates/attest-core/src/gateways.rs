// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gateway traits for external collaborators.
//!
//! The core never talks to a vendor API directly; it is handed these traits
//! at construction. HTTP implementations live in attest-clients, in-memory
//! fakes live next to the tests that use them.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DomainEventMessage, FaceMatchOutcome, NotificationMethod, StorageKey};

/// Maximum case references per batch lookup accepted by the directory.
pub const CASE_DIRECTORY_MAX_BATCH: usize = 500;

/// Gateway failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The referenced entity does not exist upstream.
    #[error("{service}: not found")]
    NotFound {
        /// The gateway that reported the miss.
        service: &'static str,
    },

    /// The upstream rejected the request as invalid.
    #[error("{service}: rejected: {reason}")]
    Rejected {
        /// The gateway that rejected the request.
        service: &'static str,
        /// Rejection detail.
        reason: String,
    },

    /// The circuit breaker is open; the call was not attempted.
    #[error("{service}: circuit open")]
    CircuitOpen {
        /// The gateway whose breaker is open.
        service: &'static str,
    },

    /// Transport or provider failure after retries.
    #[error("{service}: unavailable: {details}")]
    Unavailable {
        /// The gateway that failed.
        service: &'static str,
        /// Failure detail.
        details: String,
    },
}

impl GatewayError {
    /// The gateway this error originated from.
    pub fn service(&self) -> &'static str {
        match self {
            Self::NotFound { service }
            | Self::Rejected { service, .. }
            | Self::CircuitOpen { service }
            | Self::Unavailable { service, .. } => service,
        }
    }
}

/// Result type using GatewayError.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Contact details held by the case directory for one case reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    /// External case reference.
    pub case_reference: String,
    /// Full display name.
    pub name: String,
    /// Mobile phone number, if held.
    pub phone: Option<String>,
    /// Email address, if held.
    pub email: Option<String>,
    /// Practitioner email address, if held.
    pub practitioner_email: Option<String>,
}

/// Personal details supplied by an offender for identity verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalDetails {
    /// Given name as entered.
    pub first_name: String,
    /// Family name as entered.
    pub last_name: String,
    /// Date of birth, ISO `YYYY-MM-DD`.
    pub date_of_birth: String,
}

/// Case directory lookups, single and batched.
#[async_trait]
pub trait CaseDirectory: Send + Sync {
    /// Fetch contact details for one case reference.
    async fn get_case(&self, case_reference: &str) -> GatewayResult<Option<ContactDetails>>;

    /// Validate supplied personal details against the directory record.
    ///
    /// Returns `Ok(false)` for a directory rejection; errors are reserved
    /// for transport/provider failures.
    async fn validate_details(
        &self,
        case_reference: &str,
        details: &PersonalDetails,
    ) -> GatewayResult<bool>;

    /// Batch lookup for up to [`CASE_DIRECTORY_MAX_BATCH`] references.
    ///
    /// References the directory does not know are simply absent from the
    /// response.
    async fn get_cases(&self, case_references: &[String]) -> GatewayResult<Vec<ContactDetails>>;
}

/// One provider-side delivery status row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    /// Provider notification id.
    pub id: String,
    /// The reference the notification was sent with.
    pub reference: String,
    /// Provider status string.
    pub status: String,
}

/// One page of the provider's status listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPage {
    /// Status rows on this page.
    pub items: Vec<ProviderStatus>,
    /// Whether another page follows.
    pub has_next_page: bool,
    /// Cursor for the next page, when `has_next_page` is set.
    pub next_cursor: Option<String>,
}

/// Notification delivery provider.
#[async_trait]
pub trait NotifyGateway: Send + Sync {
    /// Send one notification; returns the provider notification id.
    async fn send(
        &self,
        method: &NotificationMethod,
        template_id: &str,
        personalisation: &HashMap<String, String>,
        reference: &str,
    ) -> GatewayResult<String>;

    /// One page of delivery statuses for notifications sent with
    /// `reference`, starting at `cursor` when given.
    async fn statuses(&self, reference: &str, cursor: Option<&str>) -> GatewayResult<StatusPage>;
}

/// Facial comparison provider.
#[async_trait]
pub trait FaceVerifier: Send + Sync {
    /// Compare the reference photo against a snapshot set with the given
    /// similarity threshold.
    async fn compare(
        &self,
        reference: &StorageKey,
        snapshots: &[StorageKey],
        similarity_threshold: f32,
    ) -> GatewayResult<FaceMatchOutcome>;
}

/// Object storage capability: existence checks and presigned URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists at `key`.
    async fn exists(&self, key: &StorageKey) -> GatewayResult<bool>;

    /// Presigned URL for reading or writing `key`, valid for `ttl`.
    async fn presigned_url(&self, key: &StorageKey, ttl: Duration) -> GatewayResult<String>;
}

/// Downstream domain event sink.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one domain event message.
    ///
    /// Callers log and swallow failures; publishing must never fail a
    /// lifecycle operation.
    async fn publish(&self, message: &DomainEventMessage) -> GatewayResult<()>;
}

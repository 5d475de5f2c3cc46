// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outbound domain events.
//!
//! One message is published per lifecycle occurrence. The message is the
//! system of record for external consumers, so publishing happens before
//! any notification fan-out and independently of its success.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle occurrences the system announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainEvent {
    /// Offender setup completed; offender became verified.
    SetupCompleted,
    /// A check-in row was created.
    CheckinCreated,
    /// The offender submitted a check-in.
    CheckinSubmitted,
    /// A practitioner reviewed a submitted check-in.
    CheckinReviewedAfterSubmission,
    /// A practitioner reviewed an expired check-in.
    CheckinReviewedAfterExpiry,
    /// A check-in expired without submission.
    CheckinExpired,
    /// The offender was reminded of an open check-in.
    CheckinReminded,
}

impl DomainEvent {
    /// Stable event-type identifier carried on the wire and in audit rows.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SetupCompleted => "setup-completed",
            Self::CheckinCreated => "checkin-created",
            Self::CheckinSubmitted => "checkin-submitted",
            Self::CheckinReviewedAfterSubmission => "reviewed-after-submission",
            Self::CheckinReviewedAfterExpiry => "reviewed-after-expiry",
            Self::CheckinExpired => "checkin-expired",
            Self::CheckinReminded => "checkin-reminded",
        }
    }
}

/// Identifier type/value pair naming the person an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonReference {
    /// Identifier type, e.g. `CASE_REFERENCE`.
    #[serde(rename = "type")]
    pub id_type: String,
    /// Identifier value.
    pub value: String,
}

impl PersonReference {
    /// Reference by external case reference.
    pub fn case_reference(value: impl Into<String>) -> Self {
        Self {
            id_type: "CASE_REFERENCE".to_string(),
            value: value.into(),
        }
    }
}

/// The published message for a single domain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEventMessage {
    /// Event-type identifier, see [`DomainEvent::event_type`].
    pub event_type: String,
    /// URL the consumer can dereference later for human-readable detail.
    pub detail_url: String,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
    /// Who the event is about.
    pub person_reference: PersonReference,
}

impl DomainEventMessage {
    /// Build a message for `event` about the person with `case_reference`.
    pub fn new(
        event: DomainEvent,
        detail_url: impl Into<String>,
        occurred_at: DateTime<Utc>,
        case_reference: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event.event_type().to_string(),
            detail_url: detail_url.into(),
            occurred_at,
            person_reference: PersonReference::case_reference(case_reference),
        }
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Check-in creation service.
//!
//! The single source of truth for instantiating a check-in for an
//! (offender, due-date) pair, used by the creation worker and by manual
//! triggers. Idempotency rests on the store's uniqueness constraint: a
//! duplicate request inserts nothing and reports the existing row.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{DomainEvent, OffenderStatus};
use crate::error::{CoreError, Result};
use crate::persistence::{AuditEventRecord, CheckinRecord, OffenderRecord, Persistence};

/// Outcome of a creation request.
#[derive(Debug, Clone)]
pub enum CreationOutcome {
    /// A new check-in was created.
    Created(CheckinRecord),
    /// A check-in for this (offender, due date) already existed.
    AlreadyExists,
}

impl CreationOutcome {
    /// The created record, when one was inserted.
    pub fn created(self) -> Option<CheckinRecord> {
        match self {
            Self::Created(record) => Some(record),
            Self::AlreadyExists => None,
        }
    }
}

/// Instantiates check-ins, guarding offender eligibility.
pub struct CheckinCreationService {
    persistence: Arc<dyn Persistence>,
}

impl CheckinCreationService {
    /// Create a new creation service.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Create a check-in for an already-loaded offender.
    ///
    /// Used by the creation worker, which has the offender rows in hand.
    pub async fn create_for(
        &self,
        offender: &OffenderRecord,
        due_date: NaiveDate,
    ) -> Result<CreationOutcome> {
        let status = OffenderStatus::parse(&offender.status).ok_or_else(|| {
            CoreError::DatabaseError {
                operation: "status".to_string(),
                details: format!("unknown offender status '{}'", offender.status),
            }
        })?;

        if status != OffenderStatus::Verified {
            return Err(CoreError::InvalidOffenderState {
                offender_id: offender.id,
                expected: OffenderStatus::Verified.as_str().to_string(),
                actual: status.as_str().to_string(),
            });
        }

        match self
            .persistence
            .insert_checkin_if_absent(offender.id, due_date)
            .await?
        {
            Some(checkin) => {
                info!(
                    checkin_id = %checkin.id,
                    offender_id = %offender.id,
                    due_date = %due_date,
                    "Check-in created"
                );
                self.record_created_audit(offender, &checkin).await;
                Ok(CreationOutcome::Created(checkin))
            }
            None => {
                debug!(
                    offender_id = %offender.id,
                    due_date = %due_date,
                    "Check-in already exists, insert suppressed"
                );
                Ok(CreationOutcome::AlreadyExists)
            }
        }
    }

    /// Create a check-in for an offender by id (manual trigger path).
    pub async fn create_for_offender(
        &self,
        offender_id: Uuid,
        due_date: NaiveDate,
    ) -> Result<CreationOutcome> {
        let offender = self
            .persistence
            .get_offender(offender_id)
            .await?
            .ok_or(CoreError::OffenderNotFound { offender_id })?;

        self.create_for(&offender, due_date).await
    }

    async fn record_created_audit(&self, offender: &OffenderRecord, checkin: &CheckinRecord) {
        let fact = AuditEventRecord {
            id: None,
            event_type: DomainEvent::CheckinCreated.event_type().to_string(),
            offender_id: offender.id,
            checkin_id: Some(checkin.id),
            practitioner_id: Some(offender.practitioner_id.clone()),
            time_to_submit_secs: None,
            time_to_review_secs: None,
            detail: None,
            created_at: Utc::now(),
        };
        if let Err(e) = self.persistence.insert_audit_event(&fact).await {
            warn!(
                checkin_id = %checkin.id,
                error = %e,
                "Failed to record creation audit fact"
            );
        }
    }
}

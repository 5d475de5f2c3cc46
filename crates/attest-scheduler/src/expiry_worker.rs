// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Check-in expiry worker.
//!
//! Moves every created check-in whose due date fell outside the grace
//! window to `expired` in one transaction, then — in a separate,
//! non-transactional phase — resolves contact details in chunks and sends
//! "expired" notices to practitioners only. The outcome of each notice is
//! recorded as an audit fact whether or not the send succeeded, so a
//! notify failure can never roll back an already-committed expiry.
//!
//! Re-running only touches rows still in `created`; expired rows are out
//! of the query's reach by construction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use attest_core::domain::DomainEvent;
use attest_core::gateways::{CASE_DIRECTORY_MAX_BATCH, CaseDirectory, ContactDetails};
use attest_core::notify::{NotificationOrchestrator, Recipients};
use attest_core::persistence::{AuditEventRecord, OffenderRecord, Persistence};

use crate::error::Result;
use crate::worker::{RunStats, ScheduledWorker};

/// Lease key and job-log name for this worker.
pub const JOB_NAME: &str = "checkin-expiry";

/// Scheduled worker expiring overdue check-ins.
pub struct ExpiryWorker {
    persistence: Arc<dyn Persistence>,
    case_directory: Arc<dyn CaseDirectory>,
    orchestrator: Arc<NotificationOrchestrator>,
    grace_period_days: i64,
}

impl ExpiryWorker {
    /// Create a new expiry worker.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        case_directory: Arc<dyn CaseDirectory>,
        orchestrator: Arc<NotificationOrchestrator>,
        grace_period_days: i64,
    ) -> Self {
        Self {
            persistence,
            case_directory,
            orchestrator,
            grace_period_days,
        }
    }

    /// Run the worker for an explicit date (tests and backfills).
    pub async fn run_for_date(&self, today: NaiveDate) -> Result<RunStats> {
        let mut stats = RunStats::default();
        let cutoff = today - ChronoDuration::days(self.grace_period_days);

        // Phase 1: one transaction flips every overdue row.
        let expired = self.persistence.expire_checkins_due_before(cutoff).await?;
        if expired.is_empty() {
            debug!(cutoff = %cutoff, "No check-ins to expire");
            return Ok(stats);
        }

        info!(cutoff = %cutoff, expired = expired.len(), "Check-ins expired");

        // Phase 2: non-transactional notification fan-out, practitioners
        // only. Contact lookup failures degrade per offender.
        let offenders = self.load_offenders(&expired).await;
        let contacts = self
            .resolve_contacts(offenders.values().collect::<Vec<_>>().as_slice())
            .await;

        for checkin in &expired {
            let Some(offender) = offenders.get(&checkin.offender_id) else {
                warn!(
                    checkin_id = %checkin.id,
                    offender_id = %checkin.offender_id,
                    "Expired check-in has no loadable offender"
                );
                stats.failed += 1;
                continue;
            };

            let contact = contacts.get(&offender.case_reference).cloned();
            let notified = match self
                .orchestrator
                .notify(
                    DomainEvent::CheckinExpired,
                    offender,
                    Some(checkin),
                    contact,
                    Recipients::PractitionerOnly,
                    Some(JOB_NAME),
                )
                .await
            {
                Ok(summary) => summary.failed == 0 && summary.undeliverable == 0,
                Err(e) => {
                    warn!(
                        checkin_id = %checkin.id,
                        error = %e,
                        "Expiry notification failed"
                    );
                    false
                }
            };

            // The audit fact is written regardless of notify success.
            let fact = AuditEventRecord {
                id: None,
                event_type: DomainEvent::CheckinExpired.event_type().to_string(),
                offender_id: offender.id,
                checkin_id: Some(checkin.id),
                practitioner_id: Some(offender.practitioner_id.clone()),
                time_to_submit_secs: None,
                time_to_review_secs: None,
                detail: Some(
                    if notified {
                        "practitioner-notified"
                    } else {
                        "notify-failed"
                    }
                    .to_string(),
                ),
                created_at: Utc::now(),
            };
            if let Err(e) = self.persistence.insert_audit_event(&fact).await {
                warn!(checkin_id = %checkin.id, error = %e, "Failed to record expiry audit fact");
            }

            if notified {
                stats.processed += 1;
            } else {
                stats.failed += 1;
            }
        }

        info!(
            expired = expired.len(),
            notified = stats.processed,
            failed = stats.failed,
            "Expiry run completed"
        );

        Ok(stats)
    }

    async fn load_offenders(
        &self,
        expired: &[attest_core::persistence::CheckinRecord],
    ) -> HashMap<Uuid, OffenderRecord> {
        let mut offenders = HashMap::new();
        for checkin in expired {
            if offenders.contains_key(&checkin.offender_id) {
                continue;
            }
            match self.persistence.get_offender(checkin.offender_id).await {
                Ok(Some(offender)) => {
                    offenders.insert(checkin.offender_id, offender);
                }
                Ok(None) => {
                    warn!(offender_id = %checkin.offender_id, "Offender row missing");
                }
                Err(e) => {
                    warn!(offender_id = %checkin.offender_id, error = %e, "Offender load failed");
                }
            }
        }
        offenders
    }

    async fn resolve_contacts(
        &self,
        offenders: &[&OffenderRecord],
    ) -> HashMap<String, ContactDetails> {
        let refs: Vec<String> = offenders.iter().map(|o| o.case_reference.clone()).collect();
        let mut contacts = HashMap::new();

        for chunk in refs.chunks(CASE_DIRECTORY_MAX_BATCH) {
            match self.case_directory.get_cases(chunk).await {
                Ok(details) => {
                    for detail in details {
                        contacts.insert(detail.case_reference.clone(), detail);
                    }
                }
                Err(e) => {
                    warn!(
                        chunk_size = chunk.len(),
                        error = %e,
                        "Case directory chunk lookup failed"
                    );
                }
            }
        }

        contacts
    }
}

#[async_trait]
impl ScheduledWorker for ExpiryWorker {
    fn job_name(&self) -> &'static str {
        JOB_NAME
    }

    async fn run_once(&self) -> Result<RunStats> {
        self.run_for_date(Utc::now().date_naive()).await
    }
}

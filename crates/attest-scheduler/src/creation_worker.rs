// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Check-in creation worker.
//!
//! Finds verified offenders whose schedule makes them due today, resolves
//! their contact details from the case directory in chunks of at most 500
//! references, creates one check-in per resolvable offender through the
//! creation service, then notifies per created row individually. One
//! offender's notification failure is caught and logged; it never blocks
//! creation or notification for the rest of the batch.
//!
//! Idempotent against at-least-once execution: the (offender, due date)
//! uniqueness constraint suppresses duplicate inserts, so a re-run for a
//! date that already produced check-ins changes nothing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use attest_core::creation::{CheckinCreationService, CreationOutcome};
use attest_core::domain::DomainEvent;
use attest_core::gateways::{CASE_DIRECTORY_MAX_BATCH, CaseDirectory, ContactDetails};
use attest_core::notify::{NotificationOrchestrator, Recipients};
use attest_core::persistence::{OffenderRecord, Persistence};

use crate::error::Result;
use crate::worker::{RunStats, ScheduledWorker};

/// Lease key and job-log name for this worker.
pub const JOB_NAME: &str = "checkin-creation";

/// Scheduled worker creating due check-ins.
pub struct CreationWorker {
    persistence: Arc<dyn Persistence>,
    case_directory: Arc<dyn CaseDirectory>,
    creation: CheckinCreationService,
    orchestrator: Arc<NotificationOrchestrator>,
}

impl CreationWorker {
    /// Create a new creation worker.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        case_directory: Arc<dyn CaseDirectory>,
        orchestrator: Arc<NotificationOrchestrator>,
    ) -> Self {
        let creation = CheckinCreationService::new(persistence.clone());
        Self {
            persistence,
            case_directory,
            creation,
            orchestrator,
        }
    }

    /// Run the worker for an explicit date (tests and backfills).
    pub async fn run_for_date(&self, today: NaiveDate) -> Result<RunStats> {
        let mut stats = RunStats::default();

        let due = self.persistence.list_offenders_due(today).await?;
        if due.is_empty() {
            debug!(date = %today, "No offenders due");
            return Ok(stats);
        }

        info!(date = %today, due = due.len(), "Creating due check-ins");

        let contacts = self.resolve_contacts(&due).await;

        for offender in &due {
            let Some(contact) = contacts.get(&offender.case_reference) else {
                warn!(
                    offender_id = %offender.id,
                    case_reference = %offender.case_reference,
                    "Case directory did not resolve offender, skipping creation"
                );
                stats.failed += 1;
                continue;
            };

            match self.creation.create_for(offender, today).await {
                Ok(CreationOutcome::Created(checkin)) => {
                    stats.processed += 1;
                    // Per-item notification; a failure here must not block
                    // the rest of the batch.
                    if let Err(e) = self
                        .orchestrator
                        .notify(
                            DomainEvent::CheckinCreated,
                            offender,
                            Some(&checkin),
                            Some(contact.clone()),
                            Recipients::OffenderAndPractitioner,
                            Some(JOB_NAME),
                        )
                        .await
                    {
                        warn!(
                            checkin_id = %checkin.id,
                            error = %e,
                            "Creation notification failed"
                        );
                    }
                }
                Ok(CreationOutcome::AlreadyExists) => {
                    debug!(
                        offender_id = %offender.id,
                        date = %today,
                        "Check-in already present, nothing to do"
                    );
                }
                Err(e) => {
                    warn!(
                        offender_id = %offender.id,
                        error = %e,
                        "Failed to create check-in"
                    );
                    stats.failed += 1;
                }
            }
        }

        info!(
            date = %today,
            created = stats.processed,
            failed = stats.failed,
            "Creation run completed"
        );

        Ok(stats)
    }

    /// Batch-resolve contact details, chunked at the directory's limit.
    ///
    /// A failing chunk degrades to "no data" for its offenders; the run
    /// continues with whatever resolved.
    async fn resolve_contacts(
        &self,
        offenders: &[OffenderRecord],
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
impl ScheduledWorker for CreationWorker {
    fn job_name(&self) -> &'static str {
        JOB_NAME
    }

    async fn run_once(&self) -> Result<RunStats> {
        self.run_for_date(Utc::now().date_naive()).await
    }
}

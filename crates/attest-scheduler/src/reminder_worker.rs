// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Check-in reminder worker.
//!
//! Reminds offenders with an open check-in at a fixed point inside the
//! grace window (default: the day after the due date). Two guards keep
//! reminders exactly-once in practice:
//!
//! - duplicate suppression by querying prior reminder notifications since
//!   the window opened, so non-production schedules that fire more than
//!   once a day send nothing twice;
//! - an explicit dependency on a completed creation run for today, read
//!   from the job log, instead of trusting cron ordering.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use attest_core::domain::DomainEvent;
use attest_core::gateways::{CASE_DIRECTORY_MAX_BATCH, CaseDirectory, ContactDetails};
use attest_core::notify::{NotificationOrchestrator, Recipients};
use attest_core::persistence::{
    AuditEventRecord, CheckinEventRecord, OffenderRecord, Persistence,
};

use crate::error::Result;
use crate::job_log;
use crate::worker::{RunStats, ScheduledWorker};

/// Lease key and job-log name for this worker.
pub const JOB_NAME: &str = "checkin-reminder";

/// Scheduled worker reminding offenders of open check-ins.
pub struct ReminderWorker {
    pool: PgPool,
    persistence: Arc<dyn Persistence>,
    case_directory: Arc<dyn CaseDirectory>,
    orchestrator: Arc<NotificationOrchestrator>,
    reminder_day_offset: i64,
}

impl ReminderWorker {
    /// Create a new reminder worker.
    ///
    /// The pool is used for the job-log dependency check; row access goes
    /// through the persistence trait.
    pub fn new(
        pool: PgPool,
        persistence: Arc<dyn Persistence>,
        case_directory: Arc<dyn CaseDirectory>,
        orchestrator: Arc<NotificationOrchestrator>,
        reminder_day_offset: i64,
    ) -> Self {
        Self {
            pool,
            persistence,
            case_directory,
            orchestrator,
            reminder_day_offset,
        }
    }

    /// Run the worker for an explicit date (tests and backfills).
    pub async fn run_for_date(&self, today: NaiveDate) -> Result<RunStats> {
        let mut stats = RunStats::default();

        // Creation must have finished for today before reminding; the job
        // log makes the ordering explicit instead of a cron coincidence.
        if !job_log::has_completed_run_on(&self.pool, crate::creation_worker::JOB_NAME, today)
            .await?
        {
            warn!(
                date = %today,
                "Creation worker has not completed today; skipping reminder run"
            );
            return Ok(stats);
        }

        let due_date = today - ChronoDuration::days(self.reminder_day_offset);
        let window_start = due_date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);

        let candidates = self
            .persistence
            .list_reminder_candidates(due_date, window_start)
            .await?;
        if candidates.is_empty() {
            debug!(due_date = %due_date, "No reminders to send");
            return Ok(stats);
        }

        info!(
            due_date = %due_date,
            candidates = candidates.len(),
            "Sending check-in reminders"
        );

        let offenders = self.load_offenders(&candidates).await;
        let contacts = self
            .resolve_contacts(offenders.values().collect::<Vec<_>>().as_slice())
            .await;

        for checkin in &candidates {
            let Some(offender) = offenders.get(&checkin.offender_id) else {
                stats.failed += 1;
                continue;
            };
            let contact = contacts.get(&offender.case_reference).cloned();

            match self
                .orchestrator
                .notify(
                    DomainEvent::CheckinReminded,
                    offender,
                    Some(checkin),
                    contact,
                    Recipients::OffenderOnly,
                    Some(JOB_NAME),
                )
                .await
            {
                Ok(_) => {
                    stats.processed += 1;

                    let now = Utc::now();
                    if let Err(e) = self
                        .persistence
                        .append_checkin_event(&CheckinEventRecord {
                            id: None,
                            checkin_id: checkin.id,
                            event_type: "reminded".to_string(),
                            note: None,
                            occurred_at: now,
                        })
                        .await
                    {
                        warn!(checkin_id = %checkin.id, error = %e, "Failed to log reminder event");
                    }

                    let fact = AuditEventRecord {
                        id: None,
                        event_type: DomainEvent::CheckinReminded.event_type().to_string(),
                        offender_id: offender.id,
                        checkin_id: Some(checkin.id),
                        practitioner_id: Some(offender.practitioner_id.clone()),
                        time_to_submit_secs: None,
                        time_to_review_secs: None,
                        detail: None,
                        created_at: now,
                    };
                    if let Err(e) = self.persistence.insert_audit_event(&fact).await {
                        warn!(checkin_id = %checkin.id, error = %e, "Failed to record reminder audit fact");
                    }
                }
                Err(e) => {
                    warn!(
                        checkin_id = %checkin.id,
                        error = %e,
                        "Reminder notification failed"
                    );
                    stats.failed += 1;
                }
            }
        }

        info!(
            reminded = stats.processed,
            failed = stats.failed,
            "Reminder run completed"
        );

        Ok(stats)
    }

    async fn load_offenders(
        &self,
        checkins: &[attest_core::persistence::CheckinRecord],
    ) -> HashMap<Uuid, OffenderRecord> {
        let mut offenders = HashMap::new();
        for checkin in checkins {
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
impl ScheduledWorker for ReminderWorker {
    fn job_name(&self) -> &'static str {
        JOB_NAME
    }

    async fn run_once(&self) -> Result<RunStats> {
        self.run_for_date(Utc::now().date_naive()).await
    }
}

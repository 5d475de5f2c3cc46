// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Notification status reconciliation worker.
//!
//! Selects local notification records that were sent but have not reached
//! a terminal provider status, groups them by provider reference, pages
//! through the provider's status API (fixed provider page size, continue
//! while the "more pages" flag is set and a cursor is returned), and
//! bulk-updates local rows grouped by their new status value.
//!
//! Terminal statuses (`delivered`, `permanent-failure`,
//! `temporary-failure`, `technical-failure`) take a record out of the
//! selection, so reconciled rows are never re-queried.
//!
//! Two instances run in production: one scoped to the batch jobs'
//! notifications and one generic/ad-hoc catch-all.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use attest_core::gateways::NotifyGateway;
use attest_core::persistence::{NotificationRecord, Persistence};

use crate::error::Result;
use crate::worker::{RunStats, ScheduledWorker};

/// Lease key for the job-scoped reconciliation worker.
pub const JOB_SCOPED_NAME: &str = "notification-status-jobs";
/// Lease key for the generic/ad-hoc reconciliation worker.
pub const ADHOC_NAME: &str = "notification-status-adhoc";

/// Which local records a reconciliation instance covers.
#[derive(Debug, Clone)]
pub enum StatusScope {
    /// Notifications produced by the named worker jobs.
    Jobs(Vec<&'static str>),
    /// Every unreconciled notification, whatever produced it.
    All,
}

/// Scheduled worker reconciling provider delivery statuses.
pub struct StatusReconciliationWorker {
    persistence: Arc<dyn Persistence>,
    gateway: Arc<dyn NotifyGateway>,
    scope: StatusScope,
    lookback: std::time::Duration,
    job_name: &'static str,
}

impl StatusReconciliationWorker {
    /// Reconciliation scoped to the batch jobs' notifications.
    pub fn job_scoped(
        persistence: Arc<dyn Persistence>,
        gateway: Arc<dyn NotifyGateway>,
        jobs: Vec<&'static str>,
        lookback: std::time::Duration,
    ) -> Self {
        Self {
            persistence,
            gateway,
            scope: StatusScope::Jobs(jobs),
            lookback,
            job_name: JOB_SCOPED_NAME,
        }
    }

    /// Generic reconciliation over every unreconciled notification.
    pub fn adhoc(
        persistence: Arc<dyn Persistence>,
        gateway: Arc<dyn NotifyGateway>,
        lookback: std::time::Duration,
    ) -> Self {
        Self {
            persistence,
            gateway,
            scope: StatusScope::All,
            lookback,
            job_name: ADHOC_NAME,
        }
    }

    /// Execute one reconciliation pass.
    pub async fn reconcile(&self) -> Result<RunStats> {
        let since = Utc::now()
            - chrono::Duration::from_std(self.lookback)
                .unwrap_or_else(|_| chrono::Duration::hours(72));

        let records = match &self.scope {
            StatusScope::All => {
                self.persistence
                    .list_unreconciled_notifications(since, None)
                    .await?
            }
            StatusScope::Jobs(jobs) => {
                let mut all = Vec::new();
                for job in jobs {
                    all.extend(
                        self.persistence
                            .list_unreconciled_notifications(since, Some(job))
                            .await?,
                    );
                }
                all
            }
        };

        if records.is_empty() {
            debug!("No notifications to reconcile");
            return Ok(RunStats::default());
        }

        info!(records = records.len(), "Reconciling notification statuses");

        // Group local records by provider reference; status lookups page
        // per reference.
        let mut by_reference: HashMap<String, Vec<NotificationRecord>> = HashMap::new();
        for record in records {
            by_reference
                .entry(record.reference.clone())
                .or_default()
                .push(record);
        }

        let mut stats = RunStats::default();
        for (reference, group) in by_reference {
            match self.reconcile_reference(&reference, &group).await {
                Ok(updated) => stats.processed += updated,
                Err(e) => {
                    warn!(
                        reference = %reference,
                        records = group.len(),
                        error = %e,
                        "Reference reconciliation failed"
                    );
                    stats.failed += group.len() as u64;
                }
            }
        }

        info!(
            updated = stats.processed,
            failed = stats.failed,
            "Reconciliation run completed"
        );

        Ok(stats)
    }

    /// Page through one reference's provider statuses and apply updates.
    async fn reconcile_reference(
        &self,
        reference: &str,
        group: &[NotificationRecord],
    ) -> Result<u64> {
        // provider id → latest provider status
        let mut provider_statuses: HashMap<String, String> = HashMap::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.gateway.statuses(reference, cursor.as_deref()).await?;
            for item in page.items {
                provider_statuses.insert(item.id, item.status);
            }
            // Continue only while the provider signals more pages and
            // yields a cursor to fetch them with.
            match (page.has_next_page, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        // Group pending updates by new status so each group is one
        // bulk update.
        let mut by_new_status: HashMap<String, Vec<Uuid>> = HashMap::new();
        for record in group {
            let Some(provider_id) = record.provider_notification_id.as_deref() else {
                continue;
            };
            let Some(new_status) = provider_statuses.get(provider_id) else {
                continue;
            };
            if *new_status != record.status {
                by_new_status
                    .entry(new_status.clone())
                    .or_default()
                    .push(record.id);
            }
        }

        let mut updated = 0;
        for (status, ids) in by_new_status {
            updated += self
                .persistence
                .update_notification_statuses(&ids, &status)
                .await?;
            debug!(
                reference = %reference,
                status = %status,
                count = ids.len(),
                "Applied provider statuses"
            );
        }

        Ok(updated)
    }
}

#[async_trait]
impl ScheduledWorker for StatusReconciliationWorker {
    fn job_name(&self) -> &'static str {
        self.job_name
    }

    async fn run_once(&self) -> Result<RunStats> {
        self.reconcile().await
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared worker surface.
//!
//! Every scheduled worker exposes a name (also its lease key and job-log
//! name) and a single run. The runtime owns the cron timer, the lease
//! acquisition, and the job-log bracket around each run; workers only do
//! their phase work and report counters.

use async_trait::async_trait;

use crate::error::Result;

/// Counters reported by one worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Items handled successfully.
    pub processed: u64,
    /// Items that failed and were skipped.
    pub failed: u64,
}

/// A worker the scheduler runtime drives on a cron timer.
#[async_trait]
pub trait ScheduledWorker: Send + Sync {
    /// Lease key and job-log name.
    fn job_name(&self) -> &'static str;

    /// Execute one run. Per-item failures are counted, not raised; an
    /// error return means the run could not proceed at all.
    async fn run_once(&self) -> Result<RunStats>;
}

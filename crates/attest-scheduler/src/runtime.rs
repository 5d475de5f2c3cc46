// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable scheduler runtime.
//!
//! Owns one timer task per worker, each driven by its cron expression.
//! Every firing follows the same bracket: try the cluster-wide lease
//! (skip the run on a miss), open a job-log row, run the worker, close
//! the row, release the lease. Shutdown is explicit: every timer is
//! signalled, then awaited, so in-flight runs drain before their leases
//! expire.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use croner::Cron;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::job_log;
use crate::lock::JobLease;
use crate::worker::ScheduledWorker;

/// One worker paired with its cron schedule.
pub struct WorkerSchedule {
    worker: Arc<dyn ScheduledWorker>,
    cron: Cron,
}

impl WorkerSchedule {
    /// Pair `worker` with a cron `expression`.
    pub fn new(worker: Arc<dyn ScheduledWorker>, expression: &str) -> Result<Self> {
        let cron = Cron::new(expression)
            .parse()
            .map_err(|e| Error::InvalidCron {
                expression: expression.to_string(),
                details: e.to_string(),
            })?;
        Ok(Self { worker, cron })
    }
}

/// A running scheduler that can be embedded in an application.
pub struct SchedulerRuntime {
    handles: Vec<(JoinHandle<()>, Arc<Notify>)>,
}

impl SchedulerRuntime {
    /// Start one timer task per schedule.
    ///
    /// `pool` is used for the job log; lease traffic goes through `lease`.
    pub fn start(
        pool: sqlx::PgPool,
        lease: Arc<dyn JobLease>,
        schedules: Vec<WorkerSchedule>,
    ) -> Self {
        // One holder identity per process instance; the lease rows show
        // which instance ran which job.
        let holder = format!("attest-{}", Uuid::new_v4());

        let mut handles = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            let shutdown = Arc::new(Notify::new());
            let handle = tokio::spawn(run_worker_timer(
                pool.clone(),
                lease.clone(),
                schedule,
                holder.clone(),
                shutdown.clone(),
            ));
            handles.push((handle, shutdown));
        }

        info!(workers = handles.len(), holder = %holder, "Scheduler runtime started");

        Self { handles }
    }

    /// Signal every timer and wait for in-flight runs to drain.
    pub async fn shutdown(self) {
        info!("Scheduler runtime shutting down");

        for (_, shutdown) in &self.handles {
            shutdown.notify_one();
        }

        for (handle, _) in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker timer task panicked");
            }
        }

        info!("Scheduler runtime stopped");
    }

    /// Whether every timer task is still running.
    pub fn is_running(&self) -> bool {
        self.handles.iter().all(|(handle, _)| !handle.is_finished())
    }
}

/// Timer loop for one worker: sleep until the next cron occurrence, then
/// run the guarded job bracket.
async fn run_worker_timer(
    pool: sqlx::PgPool,
    lease: Arc<dyn JobLease>,
    schedule: WorkerSchedule,
    holder: String,
    shutdown: Arc<Notify>,
) {
    let job_name = schedule.worker.job_name();
    info!(job_name, "Worker timer started");

    loop {
        let now = Utc::now();
        let delay = match schedule.cron.find_next_occurrence(&now, false) {
            Ok(next) => (next - now).to_std().unwrap_or(Duration::ZERO),
            Err(e) => {
                // A parsed cron that cannot produce an occurrence is a
                // configuration defect; back off instead of spinning.
                error!(job_name, error = %e, "No next cron occurrence");
                Duration::from_secs(60)
            }
        };

        tokio::select! {
            biased;

            _ = shutdown.notified() => {
                info!(job_name, "Worker timer received shutdown signal");
                break;
            }

            _ = tokio::time::sleep(delay) => {
                run_job(&pool, lease.as_ref(), schedule.worker.as_ref(), &holder).await;
            }
        }
    }

    info!(job_name, "Worker timer stopped");
}

/// One guarded job run: lease, job log, work, close, release.
async fn run_job(
    pool: &sqlx::PgPool,
    lease: &dyn JobLease,
    worker: &dyn ScheduledWorker,
    holder: &str,
) {
    let job_name = worker.job_name();

    match lease.try_acquire(job_name, holder).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(job_name, "Lease held elsewhere, skipping run");
            return;
        }
        Err(e) => {
            error!(job_name, error = %e, "Lease acquisition failed, skipping run");
            return;
        }
    }

    let log_id = match job_log::start_job(pool, job_name).await {
        Ok(id) => id,
        Err(e) => {
            // Catastrophic pre-query failure: abort the run entirely.
            error!(job_name, error = %e, "Failed to open job log, aborting run");
            if let Err(e) = lease.release(job_name, holder).await {
                warn!(job_name, error = %e, "Lease release failed");
            }
            return;
        }
    };

    match worker.run_once().await {
        Ok(stats) => {
            info!(
                job_name,
                processed = stats.processed,
                failed = stats.failed,
                "Job run finished"
            );
            if let Err(e) =
                job_log::finish_job(pool, log_id, stats.processed as i64, stats.failed as i64).await
            {
                warn!(job_name, error = %e, "Failed to close job log");
            }
        }
        Err(e) => {
            error!(job_name, error = %e, "Job run failed");
            if let Err(e) = job_log::finish_job(pool, log_id, 0, 0).await {
                warn!(job_name, error = %e, "Failed to close job log");
            }
        }
    }

    if let Err(e) = lease.release(job_name, holder).await {
        warn!(job_name, error = %e, "Lease release failed");
    }
}

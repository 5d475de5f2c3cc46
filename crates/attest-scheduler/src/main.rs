// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Attest Scheduler - Check-in Worker Service
//!
//! Runs the scheduled worker family against a shared PostgreSQL database:
//! - check-in creation (due offenders → new check-ins + notifications)
//! - check-in expiry (grace window elapsed → expired + practitioner notices)
//! - check-in reminders (open check-ins inside the grace window)
//! - notification status reconciliation (job-scoped and ad-hoc)

use std::sync::Arc;

use tracing::{info, warn};

use attest_scheduler::config::Config;
use attest_scheduler::creation_worker::CreationWorker;
use attest_scheduler::expiry_worker::ExpiryWorker;
use attest_scheduler::lock::{LeaseConfig, PostgresJobLease};
use attest_scheduler::reminder_worker::ReminderWorker;
use attest_scheduler::runtime::{SchedulerRuntime, WorkerSchedule};
use attest_scheduler::services::ServiceContext;
use attest_scheduler::status_worker::StatusReconciliationWorker;
use attest_scheduler::{creation_worker, expiry_worker, reminder_worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attest_scheduler=info,attest_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        creation_cron = %config.creation_cron,
        expiry_cron = %config.expiry_cron,
        reminder_cron = %config.reminder_cron,
        status_cron = %config.status_cron,
        grace_period_days = config.grace_period_days,
        "Starting Attest Scheduler"
    );

    // Connect to database
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    info!("Connected to database");

    // Core owns _sqlx_migrations; scheduler tables are raw SQL.
    attest_core::migrations::run_postgres(&pool).await?;
    sqlx::raw_sql(include_str!("../migrations/schema.sql"))
        .execute(&pool)
        .await?;

    info!("Database schema verified");

    // Gateways and services: explicitly constructed, injected, bounded to
    // this process.
    let services = ServiceContext::from_config(pool.clone(), &config)?;

    // Workers
    let creation = Arc::new(CreationWorker::new(
        services.persistence.clone(),
        services.case_directory.clone(),
        services.orchestrator.clone(),
    ));
    let expiry = Arc::new(ExpiryWorker::new(
        services.persistence.clone(),
        services.case_directory.clone(),
        services.orchestrator.clone(),
        config.grace_period_days,
    ));
    let reminder = Arc::new(ReminderWorker::new(
        pool.clone(),
        services.persistence.clone(),
        services.case_directory.clone(),
        services.orchestrator.clone(),
        config.reminder_day_offset,
    ));
    let status_jobs = Arc::new(StatusReconciliationWorker::job_scoped(
        services.persistence.clone(),
        services.notify_gateway.clone(),
        vec![
            creation_worker::JOB_NAME,
            expiry_worker::JOB_NAME,
            reminder_worker::JOB_NAME,
        ],
        config.status_lookback,
    ));
    let status_adhoc = Arc::new(StatusReconciliationWorker::adhoc(
        services.persistence.clone(),
        services.notify_gateway.clone(),
        config.status_lookback,
    ));

    let lease = Arc::new(PostgresJobLease::new(
        pool.clone(),
        LeaseConfig {
            min_hold: config.lock_min_hold,
            max_hold: config.lock_max_hold,
        },
    ));

    let runtime = SchedulerRuntime::start(
        pool,
        lease,
        vec![
            WorkerSchedule::new(creation, &config.creation_cron)?,
            WorkerSchedule::new(expiry, &config.expiry_cron)?,
            WorkerSchedule::new(reminder, &config.reminder_cron)?,
            WorkerSchedule::new(status_jobs, &config.status_cron)?,
            WorkerSchedule::new(status_adhoc, &config.status_cron)?,
        ],
    );

    info!("Attest Scheduler ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown: drain in-flight runs before leases expire.
    runtime.shutdown().await;

    info!("Attest Scheduler shut down");

    Ok(())
}

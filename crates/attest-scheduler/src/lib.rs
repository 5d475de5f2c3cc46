// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Attest Scheduler - Scheduled Worker Family
//!
//! Unattended workers that drive the check-in lifecycle on cron timers
//! across any number of service instances:
//!
//! | Worker | Job name | What it does |
//! |--------|----------|--------------|
//! | [`creation_worker::CreationWorker`] | `checkin-creation` | creates due check-ins and notifies per row |
//! | [`expiry_worker::ExpiryWorker`] | `checkin-expiry` | expires overdue check-ins, notifies practitioners |
//! | [`reminder_worker::ReminderWorker`] | `checkin-reminder` | reminds offenders inside the grace window |
//! | [`status_worker::StatusReconciliationWorker`] | `notification-status-*` | reconciles provider delivery statuses |
//!
//! # Correctness model
//!
//! Every run follows the same bracket (see [`runtime`]): try the
//! cluster-wide [`lock::JobLease`] — skip on a miss — open a [`job_log`]
//! row, run the worker's phases in short, separate transactions, close
//! the row, release the lease. Workers are idempotent against
//! at-least-once execution: creation is guarded by the
//! (offender, due date) uniqueness constraint, expiry and reminders only
//! select rows not yet transitioned, and reconciliation never re-queries
//! terminal statuses.
//!
//! # Configuration
//!
//! Loaded from environment variables, see [`config::Config`]:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ATTEST_DATABASE_URL` | required | PostgreSQL connection string |
//! | `ATTEST_CREATION_CRON` | `0 6 * * *` | creation worker schedule |
//! | `ATTEST_EXPIRY_CRON` | `30 6 * * *` | expiry worker schedule |
//! | `ATTEST_REMINDER_CRON` | `0 9 * * *` | reminder worker schedule |
//! | `ATTEST_STATUS_CRON` | `*/15 * * * *` | reconciliation schedule |
//! | `ATTEST_GRACE_PERIOD_DAYS` | `3` | days before a check-in expires |
//! | `ATTEST_LOCK_MIN_HOLD_SECS` | `30` | lease min hold |
//! | `ATTEST_LOCK_MAX_HOLD_SECS` | `900` | lease max hold |

#![deny(missing_docs)]

/// Scheduler configuration from environment variables.
pub mod config;

/// Check-in creation worker.
pub mod creation_worker;

/// Error types for scheduler operations.
pub mod error;

/// Check-in expiry worker.
pub mod expiry_worker;

/// Worker run log.
pub mod job_log;

/// Cluster-wide job lease.
pub mod lock;

/// Check-in reminder worker.
pub mod reminder_worker;

/// Scheduler runtime: cron timers, job bracket, graceful shutdown.
pub mod runtime;

/// Gateway and service wiring from configuration.
pub mod services;

/// Notification status reconciliation worker.
pub mod status_worker;

/// Shared worker trait and run counters.
pub mod worker;

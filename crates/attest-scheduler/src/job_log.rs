// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker run log.
//!
//! One row per worker execution, for operational visibility and for the
//! reminder worker's explicit dependency on a completed creation run.

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::error::Result;

/// Open a job log row; returns its id.
pub async fn start_job(pool: &PgPool, job_name: &str) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO job_log (job_name, started_at) VALUES ($1, NOW()) RETURNING id",
    )
    .bind(job_name)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Close a job log row with its item counters.
pub async fn finish_job(pool: &PgPool, id: i64, processed: i64, failed: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE job_log
        SET finished_at = NOW(), items_processed = $2, items_failed = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(processed as i32)
    .bind(failed as i32)
    .execute(pool)
    .await?;

    Ok(())
}

/// Whether `job_name` has a completed run on `date` (UTC).
///
/// The reminder worker calls this instead of trusting cron ordering: it
/// only runs once the creation worker has finished for the day.
pub async fn has_completed_run_on(pool: &PgPool, job_name: &str, date: NaiveDate) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1::bigint FROM job_log
        WHERE job_name = $1
          AND finished_at IS NOT NULL
          AND started_at::date = $2
        LIMIT 1
        "#,
    )
    .bind(job_name)
    .bind(date)
    .fetch_optional(pool)
    .await?;

    Ok(found.is_some())
}

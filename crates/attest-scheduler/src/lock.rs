// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster-wide job lease.
//!
//! Each worker run tries to acquire a lease keyed by worker name before
//! touching any rows. A run that misses the lease skips — no queueing, no
//! retry. The lease is a time-bounded lock, not an indefinite one:
//!
//! - **max hold** bounds a holder that dies mid-run; the row expires and
//!   the next run can acquire.
//! - **min hold** keeps the lease taken for a minimum period even after a
//!   fast run releases, so a second instance firing moments later cannot
//!   re-run the job immediately.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::error::Result;

/// Lease hold bounds for one worker.
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Minimum time the lease stays taken after release.
    pub min_hold: Duration,
    /// Maximum time a holder may keep the lease before it expires.
    pub max_hold: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            min_hold: Duration::from_secs(30),
            max_hold: Duration::from_secs(900),
        }
    }
}

/// Cluster-wide mutual exclusion for worker runs.
#[async_trait]
pub trait JobLease: Send + Sync {
    /// Try to acquire the lease for `job_name` on behalf of `holder`.
    ///
    /// Returns false when another holder currently has it (or its min-hold
    /// window has not yet elapsed).
    async fn try_acquire(&self, job_name: &str, holder: &str) -> Result<bool>;

    /// Release the lease, honoring the min-hold window.
    ///
    /// A release by a non-holder is a no-op; the lease may have expired and
    /// been taken over while this run was finishing.
    async fn release(&self, job_name: &str, holder: &str) -> Result<()>;
}

/// PostgreSQL-backed lease over the `job_locks` table.
pub struct PostgresJobLease {
    pool: PgPool,
    config: LeaseConfig,
}

impl PostgresJobLease {
    /// Create a new lease store.
    pub fn new(pool: PgPool, config: LeaseConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl JobLease for PostgresJobLease {
    async fn try_acquire(&self, job_name: &str, holder: &str) -> Result<bool> {
        // Single upsert: take the row when absent or expired. lock_until
        // starts at max_hold so a crashed holder cannot block forever.
        let acquired: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO job_locks (job_name, locked_by, locked_at, lock_until)
            VALUES ($1, $2, NOW(), NOW() + $3 * INTERVAL '1 second')
            ON CONFLICT (job_name) DO UPDATE
            SET locked_by = EXCLUDED.locked_by,
                locked_at = EXCLUDED.locked_at,
                lock_until = EXCLUDED.lock_until
            WHERE job_locks.lock_until < NOW()
            RETURNING locked_by
            "#,
        )
        .bind(job_name)
        .bind(holder)
        .bind(self.config.max_hold.as_secs() as i64)
        .fetch_optional(&self.pool)
        .await?;

        let got_it = acquired.as_deref() == Some(holder);
        debug!(job_name, holder, acquired = got_it, "Lease acquisition attempt");
        Ok(got_it)
    }

    async fn release(&self, job_name: &str, holder: &str) -> Result<()> {
        // Shrink lock_until to the min-hold window, but only for our own
        // unexpired lease.
        sqlx::query(
            r#"
            UPDATE job_locks
            SET lock_until = GREATEST(NOW(), locked_at + $3 * INTERVAL '1 second')
            WHERE job_name = $1 AND locked_by = $2 AND lock_until > NOW()
            "#,
        )
        .bind(job_name)
        .bind(holder)
        .bind(self.config.min_hold.as_secs() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// In-memory lease for unit tests.
pub struct InMemoryJobLease {
    config: LeaseConfig,
    leases: Mutex<HashMap<String, (String, DateTime<Utc>, DateTime<Utc>)>>,
}

impl InMemoryJobLease {
    /// Create an empty in-memory lease store.
    pub fn new(config: LeaseConfig) -> Self {
        Self {
            config,
            leases: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryJobLease {
    fn default() -> Self {
        Self::new(LeaseConfig::default())
    }
}

#[async_trait]
impl JobLease for InMemoryJobLease {
    async fn try_acquire(&self, job_name: &str, holder: &str) -> Result<bool> {
        let now = Utc::now();
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        match leases.get(job_name) {
            Some((_, _, lock_until)) if *lock_until > now => Ok(false),
            _ => {
                let until = now
                    + chrono::Duration::from_std(self.config.max_hold)
                        .unwrap_or_else(|_| chrono::Duration::seconds(900));
                leases.insert(job_name.to_string(), (holder.to_string(), now, until));
                Ok(true)
            }
        }
    }

    async fn release(&self, job_name: &str, holder: &str) -> Result<()> {
        let now = Utc::now();
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((owner, locked_at, lock_until)) = leases.get_mut(job_name)
            && owner == holder
            && *lock_until > now
        {
            let min = chrono::Duration::from_std(self.config.min_hold)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));
            *lock_until = (*locked_at + min).max(now);
        }
        Ok(())
    }
}

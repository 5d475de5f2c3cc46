// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence operations for attest-core.
//!
//! Provides all durable storage access for offenders, check-ins, the
//! phase-event log, notifications, and audit facts.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::CoreError;

use super::{
    AuditEventRecord, CheckinEventRecord, CheckinPhases, CheckinRecord, NotificationRecord,
    OffenderRecord, Persistence,
};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for callers that share it.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const CHECKIN_COLUMNS: &str = "id, offender_id, due_date, status::text as status, survey, \
     auto_id_check, manual_id_check, created_at";

const OFFENDER_COLUMNS: &str = "id, case_reference, practitioner_id, status::text as status, \
     first_checkin, checkin_interval_days, created_at, updated_at";

// ============================================================================
// Offender Operations
// ============================================================================

/// Create a new offender record in `initial` status.
pub async fn create_offender(
    pool: &PgPool,
    case_reference: &str,
    practitioner_id: &str,
    first_checkin: NaiveDate,
    checkin_interval_days: i32,
) -> Result<OffenderRecord, CoreError> {
    let record = sqlx::query_as::<_, OffenderRecord>(&format!(
        r#"
        INSERT INTO offenders (id, case_reference, practitioner_id, status, first_checkin, checkin_interval_days)
        VALUES ($1, $2, $3, 'initial'::offender_status, $4, $5)
        RETURNING {OFFENDER_COLUMNS}
        "#,
    ))
    .bind(Uuid::new_v4())
    .bind(case_reference)
    .bind(practitioner_id)
    .bind(first_checkin)
    .bind(checkin_interval_days)
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Get an offender by ID.
pub async fn get_offender(
    pool: &PgPool,
    offender_id: Uuid,
) -> Result<Option<OffenderRecord>, CoreError> {
    let record = sqlx::query_as::<_, OffenderRecord>(&format!(
        "SELECT {OFFENDER_COLUMNS} FROM offenders WHERE id = $1",
    ))
    .bind(offender_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Update offender status.
pub async fn update_offender_status(
    pool: &PgPool,
    offender_id: Uuid,
    status: &str,
) -> Result<(), CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE offenders
        SET status = $2::offender_status, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(offender_id)
    .bind(status)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::OffenderNotFound { offender_id });
    }

    Ok(())
}

/// Verified offenders due on `today` with no check-in for that date.
///
/// Dueness is evaluated in the store: the day distance from `first_checkin`
/// must be a non-negative whole multiple of the interval.
pub async fn list_offenders_due(
    pool: &PgPool,
    today: NaiveDate,
) -> Result<Vec<OffenderRecord>, CoreError> {
    let records = sqlx::query_as::<_, OffenderRecord>(&format!(
        r#"
        SELECT {OFFENDER_COLUMNS}
        FROM offenders o
        WHERE o.status = 'verified'::offender_status
          AND o.checkin_interval_days > 0
          AND o.first_checkin <= $1
          AND MOD(($1 - o.first_checkin), o.checkin_interval_days) = 0
          AND NOT EXISTS (
              SELECT 1 FROM checkins c
              WHERE c.offender_id = o.id AND c.due_date = $1
          )
        ORDER BY o.created_at
        "#,
    ))
    .bind(today)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

// ============================================================================
// Check-in Operations
// ============================================================================

/// Insert a check-in unless one exists for (offender, due date).
pub async fn insert_checkin_if_absent(
    pool: &PgPool,
    offender_id: Uuid,
    due_date: NaiveDate,
) -> Result<Option<CheckinRecord>, CoreError> {
    let record = sqlx::query_as::<_, CheckinRecord>(&format!(
        r#"
        INSERT INTO checkins (id, offender_id, due_date, status)
        VALUES ($1, $2, $3, 'created'::checkin_status)
        ON CONFLICT (offender_id, due_date) DO NOTHING
        RETURNING {CHECKIN_COLUMNS}
        "#,
    ))
    .bind(Uuid::new_v4())
    .bind(offender_id)
    .bind(due_date)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Get a check-in by ID.
pub async fn get_checkin(
    pool: &PgPool,
    checkin_id: Uuid,
) -> Result<Option<CheckinRecord>, CoreError> {
    let record = sqlx::query_as::<_, CheckinRecord>(&format!(
        "SELECT {CHECKIN_COLUMNS} FROM checkins WHERE id = $1",
    ))
    .bind(checkin_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Compare-and-set status transition; false when the row was not in `from`.
pub async fn transition_checkin(
    pool: &PgPool,
    checkin_id: Uuid,
    from: &str,
    to: &str,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE checkins
        SET status = $3::checkin_status
        WHERE id = $1 AND status = $2::checkin_status
        "#,
    )
    .bind(checkin_id)
    .bind(from)
    .bind(to)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Guarded submit: created → submitted, storing the survey payload.
pub async fn submit_checkin(
    pool: &PgPool,
    checkin_id: Uuid,
    survey: &serde_json::Value,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE checkins
        SET status = 'submitted'::checkin_status, survey = $2
        WHERE id = $1 AND status = 'created'::checkin_status
        "#,
    )
    .bind(checkin_id)
    .bind(survey)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record the manual identity check taken at review time.
pub async fn set_manual_id_check(
    pool: &PgPool,
    checkin_id: Uuid,
    outcome: &str,
) -> Result<(), CoreError> {
    let result = sqlx::query("UPDATE checkins SET manual_id_check = $2 WHERE id = $1")
        .bind(checkin_id)
        .bind(outcome)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::CheckinNotFound { checkin_id });
    }

    Ok(())
}

/// Overwrite the automated face-match outcome.
pub async fn set_auto_id_check(
    pool: &PgPool,
    checkin_id: Uuid,
    outcome: &str,
) -> Result<(), CoreError> {
    let result = sqlx::query("UPDATE checkins SET auto_id_check = $2 WHERE id = $1")
        .bind(checkin_id)
        .bind(outcome)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::CheckinNotFound { checkin_id });
    }

    Ok(())
}

/// Expire created check-ins due before `cutoff` in one transaction,
/// appending the matching `expired` phase events.
pub async fn expire_checkins_due_before(
    pool: &PgPool,
    cutoff: NaiveDate,
) -> Result<Vec<CheckinRecord>, CoreError> {
    let mut tx = pool.begin().await?;

    let expired = sqlx::query_as::<_, CheckinRecord>(&format!(
        r#"
        UPDATE checkins
        SET status = 'expired'::checkin_status
        WHERE status = 'created'::checkin_status AND due_date < $1
        RETURNING {CHECKIN_COLUMNS}
        "#,
    ))
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await?;

    for checkin in &expired {
        sqlx::query(
            r#"
            INSERT INTO checkin_events (checkin_id, event_type, occurred_at)
            VALUES ($1, 'expired', NOW())
            "#,
        )
        .bind(checkin.id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(expired)
}

/// Created check-ins due exactly on `due_date` without a reminder
/// notification since `window_start`.
pub async fn list_reminder_candidates(
    pool: &PgPool,
    due_date: NaiveDate,
    window_start: DateTime<Utc>,
) -> Result<Vec<CheckinRecord>, CoreError> {
    let records = sqlx::query_as::<_, CheckinRecord>(&format!(
        r#"
        SELECT {CHECKIN_COLUMNS}
        FROM checkins c
        WHERE c.status = 'created'::checkin_status
          AND c.due_date = $1
          AND NOT EXISTS (
              SELECT 1 FROM notifications n
              WHERE n.checkin_id = c.id
                AND n.event_type = 'checkin-reminded'
                AND n.created_at >= $2
          )
        ORDER BY c.created_at
        "#,
    ))
    .bind(due_date)
    .bind(window_start)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

// ============================================================================
// Phase Event Operations
// ============================================================================

/// Append one phase event to the check-in log.
pub async fn append_checkin_event(
    pool: &PgPool,
    event: &CheckinEventRecord,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO checkin_events (checkin_id, event_type, note, occurred_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(event.checkin_id)
    .bind(&event.event_type)
    .bind(&event.note)
    .bind(event.occurred_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Whether the check-in already logged an event of `event_type`.
pub async fn has_checkin_event(
    pool: &PgPool,
    checkin_id: Uuid,
    event_type: &str,
) -> Result<bool, CoreError> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1::bigint FROM checkin_events WHERE checkin_id = $1 AND event_type = $2 LIMIT 1",
    )
    .bind(checkin_id)
    .bind(event_type)
    .fetch_optional(pool)
    .await?;

    Ok(found.is_some())
}

/// Fold the phase-event log into derived timestamps.
pub async fn get_checkin_phases(
    pool: &PgPool,
    checkin_id: Uuid,
) -> Result<CheckinPhases, CoreError> {
    let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT event_type, occurred_at
        FROM checkin_events
        WHERE checkin_id = $1
        ORDER BY occurred_at
        "#,
    )
    .bind(checkin_id)
    .fetch_all(pool)
    .await?;

    let mut phases = CheckinPhases::default();
    for (event_type, occurred_at) in rows {
        match event_type.as_str() {
            // First occurrence wins for one-shot phases.
            "started" => phases.started_at.get_or_insert(occurred_at),
            "submitted" => phases.submitted_at.get_or_insert(occurred_at),
            "reviewed" => phases.reviewed_at.get_or_insert(occurred_at),
            "expired" => phases.expired_at.get_or_insert(occurred_at),
            // Reminders repeat; the latest is the interesting one.
            "reminded" => phases.last_reminded_at.insert(occurred_at),
            _ => continue,
        };
    }

    Ok(phases)
}

// ============================================================================
// Notification Operations
// ============================================================================

/// Persist a batch of pending notification tasks in one transaction.
pub async fn insert_notifications(
    pool: &PgPool,
    notifications: &[NotificationRecord],
) -> Result<(), CoreError> {
    let mut tx = pool.begin().await?;

    for notification in notifications {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, event_type, recipient_type, channel, provider_notification_id,
                 status, reference, template_id, offender_id, checkin_id, job_name,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.event_type)
        .bind(&notification.recipient_type)
        .bind(&notification.channel)
        .bind(&notification.provider_notification_id)
        .bind(&notification.status)
        .bind(&notification.reference)
        .bind(&notification.template_id)
        .bind(notification.offender_id)
        .bind(notification.checkin_id)
        .bind(&notification.job_name)
        .bind(notification.created_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Record the immediate outcome of one delivery call.
pub async fn update_notification_send_result(
    pool: &PgPool,
    notification_id: Uuid,
    status: &str,
    provider_notification_id: Option<&str>,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE notifications
        SET status = $2,
            provider_notification_id = COALESCE($3, provider_notification_id),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(notification_id)
    .bind(status)
    .bind(provider_notification_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Sent, non-terminal notifications newer than `since`.
///
/// `pending` rows were never sent and `failed` rows never reached the
/// provider, so neither can be reconciled.
pub async fn list_unreconciled_notifications(
    pool: &PgPool,
    since: DateTime<Utc>,
    job_name: Option<&str>,
) -> Result<Vec<NotificationRecord>, CoreError> {
    let records = sqlx::query_as::<_, NotificationRecord>(
        r#"
        SELECT id, event_type, recipient_type, channel, provider_notification_id,
               status, reference, template_id, offender_id, checkin_id, job_name,
               created_at, updated_at
        FROM notifications
        WHERE status NOT IN
              ('pending', 'failed',
               'delivered', 'permanent-failure', 'temporary-failure', 'technical-failure')
          AND created_at > $1
          AND ($2::text IS NULL OR job_name = $2)
        ORDER BY created_at
        "#,
    )
    .bind(since)
    .bind(job_name)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Bulk-update a group of notifications to a provider status.
pub async fn update_notification_statuses(
    pool: &PgPool,
    notification_ids: &[Uuid],
    status: &str,
) -> Result<u64, CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET status = $2, updated_at = NOW()
        WHERE id = ANY($1)
        "#,
    )
    .bind(notification_ids)
    .bind(status)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// Audit Operations
// ============================================================================

/// Insert one audit fact row.
pub async fn insert_audit_event(pool: &PgPool, event: &AuditEventRecord) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO audit_events
            (event_type, offender_id, checkin_id, practitioner_id,
             time_to_submit_secs, time_to_review_secs, detail, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&event.event_type)
    .bind(event.offender_id)
    .bind(event.checkin_id)
    .bind(&event.practitioner_id)
    .bind(event.time_to_submit_secs)
    .bind(event.time_to_review_secs)
    .bind(&event.detail)
    .bind(event.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

// ============================================================================
// Trait Implementation
// ============================================================================

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn create_offender(
        &self,
        case_reference: &str,
        practitioner_id: &str,
        first_checkin: NaiveDate,
        checkin_interval_days: i32,
    ) -> Result<OffenderRecord, CoreError> {
        create_offender(
            &self.pool,
            case_reference,
            practitioner_id,
            first_checkin,
            checkin_interval_days,
        )
        .await
    }

    async fn get_offender(&self, offender_id: Uuid) -> Result<Option<OffenderRecord>, CoreError> {
        get_offender(&self.pool, offender_id).await
    }

    async fn update_offender_status(
        &self,
        offender_id: Uuid,
        status: &str,
    ) -> Result<(), CoreError> {
        update_offender_status(&self.pool, offender_id, status).await
    }

    async fn list_offenders_due(&self, today: NaiveDate) -> Result<Vec<OffenderRecord>, CoreError> {
        list_offenders_due(&self.pool, today).await
    }

    async fn insert_checkin_if_absent(
        &self,
        offender_id: Uuid,
        due_date: NaiveDate,
    ) -> Result<Option<CheckinRecord>, CoreError> {
        insert_checkin_if_absent(&self.pool, offender_id, due_date).await
    }

    async fn get_checkin(&self, checkin_id: Uuid) -> Result<Option<CheckinRecord>, CoreError> {
        get_checkin(&self.pool, checkin_id).await
    }

    async fn transition_checkin(
        &self,
        checkin_id: Uuid,
        from: &str,
        to: &str,
    ) -> Result<bool, CoreError> {
        transition_checkin(&self.pool, checkin_id, from, to).await
    }

    async fn submit_checkin(
        &self,
        checkin_id: Uuid,
        survey: &serde_json::Value,
    ) -> Result<bool, CoreError> {
        submit_checkin(&self.pool, checkin_id, survey).await
    }

    async fn set_manual_id_check(&self, checkin_id: Uuid, outcome: &str) -> Result<(), CoreError> {
        set_manual_id_check(&self.pool, checkin_id, outcome).await
    }

    async fn set_auto_id_check(&self, checkin_id: Uuid, outcome: &str) -> Result<(), CoreError> {
        set_auto_id_check(&self.pool, checkin_id, outcome).await
    }

    async fn expire_checkins_due_before(
        &self,
        cutoff: NaiveDate,
    ) -> Result<Vec<CheckinRecord>, CoreError> {
        expire_checkins_due_before(&self.pool, cutoff).await
    }

    async fn list_reminder_candidates(
        &self,
        due_date: NaiveDate,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<CheckinRecord>, CoreError> {
        list_reminder_candidates(&self.pool, due_date, window_start).await
    }

    async fn append_checkin_event(&self, event: &CheckinEventRecord) -> Result<(), CoreError> {
        append_checkin_event(&self.pool, event).await
    }

    async fn has_checkin_event(
        &self,
        checkin_id: Uuid,
        event_type: &str,
    ) -> Result<bool, CoreError> {
        has_checkin_event(&self.pool, checkin_id, event_type).await
    }

    async fn get_checkin_phases(&self, checkin_id: Uuid) -> Result<CheckinPhases, CoreError> {
        get_checkin_phases(&self.pool, checkin_id).await
    }

    async fn insert_notifications(
        &self,
        notifications: &[NotificationRecord],
    ) -> Result<(), CoreError> {
        insert_notifications(&self.pool, notifications).await
    }

    async fn update_notification_send_result(
        &self,
        notification_id: Uuid,
        status: &str,
        provider_notification_id: Option<&str>,
    ) -> Result<(), CoreError> {
        update_notification_send_result(&self.pool, notification_id, status, provider_notification_id)
            .await
    }

    async fn list_unreconciled_notifications(
        &self,
        since: DateTime<Utc>,
        job_name: Option<&str>,
    ) -> Result<Vec<NotificationRecord>, CoreError> {
        list_unreconciled_notifications(&self.pool, since, job_name).await
    }

    async fn update_notification_statuses(
        &self,
        notification_ids: &[Uuid],
        status: &str,
    ) -> Result<u64, CoreError> {
        update_notification_statuses(&self.pool, notification_ids, status).await
    }

    async fn insert_audit_event(&self, event: &AuditEventRecord) -> Result<(), CoreError> {
        insert_audit_event(&self.pool, event).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let one: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(one == 1)
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for attest-core.
//!
//! This module defines the persistence abstraction and the record types
//! read from and written to durable storage.

pub mod postgres;

pub use self::postgres::PostgresPersistence;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::CoreError;

/// Offender record from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OffenderRecord {
    /// Internal identifier.
    pub id: Uuid,
    /// External case reference.
    pub case_reference: String,
    /// Owning practitioner identifier.
    pub practitioner_id: String,
    /// Current status (initial, verified, inactive).
    pub status: String,
    /// Date of the first scheduled check-in.
    pub first_checkin: NaiveDate,
    /// Days between scheduled check-ins.
    pub checkin_interval_days: i32,
    /// When the offender was registered.
    pub created_at: DateTime<Utc>,
    /// When the offender was last mutated.
    pub updated_at: DateTime<Utc>,
}

/// Check-in record from the persistence layer.
///
/// Lifecycle state is the explicit `status` column; phase timestamps live
/// in the append-only `checkin_events` log, see [`CheckinPhases`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CheckinRecord {
    /// Internal identifier.
    pub id: Uuid,
    /// Offender this check-in belongs to.
    pub offender_id: Uuid,
    /// The date the check-in is due.
    pub due_date: NaiveDate,
    /// Current status (created, submitted, reviewed, expired).
    pub status: String,
    /// Opaque survey payload stored at submission.
    pub survey: Option<serde_json::Value>,
    /// Automated face-match outcome; overwritten on re-verification.
    pub auto_id_check: Option<String>,
    /// Manual identity-check result recorded at review.
    pub manual_id_check: Option<String>,
    /// When the check-in row was created.
    pub created_at: DateTime<Utc>,
}

/// Phase timestamps derived from the check-in event log.
#[derive(Debug, Clone, Default)]
pub struct CheckinPhases {
    /// When identity verification first succeeded.
    pub started_at: Option<DateTime<Utc>>,
    /// When the offender submitted.
    pub submitted_at: Option<DateTime<Utc>>,
    /// When the practitioner reviewed.
    pub reviewed_at: Option<DateTime<Utc>>,
    /// When the expiry worker expired the check-in.
    pub expired_at: Option<DateTime<Utc>>,
    /// When the offender was last reminded.
    pub last_reminded_at: Option<DateTime<Utc>>,
}

/// One append-only check-in phase event.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CheckinEventRecord {
    /// Database primary key (None when inserting).
    #[sqlx(default)]
    pub id: Option<i64>,
    /// Check-in this event belongs to.
    pub checkin_id: Uuid,
    /// Phase name (started, submitted, reviewed, expired, reminded, annotated).
    pub event_type: String,
    /// Free-text note, where the phase carries one.
    pub note: Option<String>,
    /// When the phase occurred.
    pub occurred_at: DateTime<Utc>,
}

/// Notification record from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRecord {
    /// Internal identifier.
    pub id: Uuid,
    /// Domain event type this notification announces.
    pub event_type: String,
    /// Recipient type (offender, practitioner).
    pub recipient_type: String,
    /// Delivery channel (sms, email).
    pub channel: String,
    /// Provider-side notification id, set once sent.
    pub provider_notification_id: Option<String>,
    /// Local or provider status string.
    pub status: String,
    /// Reference used for provider-side status lookup.
    pub reference: String,
    /// Provider template id.
    pub template_id: String,
    /// Offender the notification concerns.
    pub offender_id: Option<Uuid>,
    /// Check-in the notification concerns, if any.
    pub checkin_id: Option<Uuid>,
    /// Worker run that produced the notification, if any.
    pub job_name: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,
}

/// Denormalized audit fact row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEventRecord {
    /// Database primary key (None when inserting).
    #[sqlx(default)]
    pub id: Option<i64>,
    /// Event type, including review subtypes.
    pub event_type: String,
    /// Offender the event concerns.
    pub offender_id: Uuid,
    /// Check-in the event concerns, if any.
    pub checkin_id: Option<Uuid>,
    /// Practitioner involved, if any.
    pub practitioner_id: Option<String>,
    /// Seconds from creation to submission, for reporting.
    pub time_to_submit_secs: Option<i64>,
    /// Seconds from submission/expiry to review, for reporting.
    pub time_to_review_secs: Option<i64>,
    /// Free-text detail (for example undeliverable markers).
    pub detail: Option<String>,
    /// When the fact was recorded.
    pub created_at: DateTime<Utc>,
}

/// Persistence interface used by the lifecycle services and workers.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    // ========================================================================
    // Offenders
    // ========================================================================

    async fn create_offender(
        &self,
        case_reference: &str,
        practitioner_id: &str,
        first_checkin: NaiveDate,
        checkin_interval_days: i32,
    ) -> Result<OffenderRecord, CoreError>;

    async fn get_offender(&self, offender_id: Uuid) -> Result<Option<OffenderRecord>, CoreError>;

    async fn update_offender_status(
        &self,
        offender_id: Uuid,
        status: &str,
    ) -> Result<(), CoreError>;

    /// Verified offenders due on `today` with no check-in for that date.
    ///
    /// Dueness is the modular schedule arithmetic evaluated set-based in
    /// the store.
    async fn list_offenders_due(&self, today: NaiveDate) -> Result<Vec<OffenderRecord>, CoreError>;

    // ========================================================================
    // Check-ins
    // ========================================================================

    /// Insert a check-in for (offender, due date) unless one exists.
    ///
    /// Returns `None` when the uniqueness constraint suppressed the insert.
    async fn insert_checkin_if_absent(
        &self,
        offender_id: Uuid,
        due_date: NaiveDate,
    ) -> Result<Option<CheckinRecord>, CoreError>;

    async fn get_checkin(&self, checkin_id: Uuid) -> Result<Option<CheckinRecord>, CoreError>;

    /// Compare-and-set status transition.
    ///
    /// Returns false when the row was not in `from` status (lost race or
    /// invalid predecessor); no mutation happens in that case.
    async fn transition_checkin(
        &self,
        checkin_id: Uuid,
        from: &str,
        to: &str,
    ) -> Result<bool, CoreError>;

    /// Guarded submit: moves created → submitted and stores the survey.
    async fn submit_checkin(
        &self,
        checkin_id: Uuid,
        survey: &serde_json::Value,
    ) -> Result<bool, CoreError>;

    /// Record the manual identity check taken at review time.
    async fn set_manual_id_check(&self, checkin_id: Uuid, outcome: &str) -> Result<(), CoreError>;

    /// Overwrite the automated face-match outcome.
    async fn set_auto_id_check(&self, checkin_id: Uuid, outcome: &str) -> Result<(), CoreError>;

    /// Expire every created check-in due before `cutoff`; returns the
    /// expired rows. Runs in a single transaction together with the
    /// matching `expired` phase events.
    async fn expire_checkins_due_before(
        &self,
        cutoff: NaiveDate,
    ) -> Result<Vec<CheckinRecord>, CoreError>;

    /// Created check-ins due exactly on `due_date` that have no reminder
    /// notification recorded since `window_start`.
    async fn list_reminder_candidates(
        &self,
        due_date: NaiveDate,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<CheckinRecord>, CoreError>;

    // ========================================================================
    // Check-in phase events
    // ========================================================================

    async fn append_checkin_event(&self, event: &CheckinEventRecord) -> Result<(), CoreError>;

    async fn has_checkin_event(
        &self,
        checkin_id: Uuid,
        event_type: &str,
    ) -> Result<bool, CoreError>;

    async fn get_checkin_phases(&self, checkin_id: Uuid) -> Result<CheckinPhases, CoreError>;

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Persist a batch of pending notification tasks in one transaction.
    async fn insert_notifications(
        &self,
        notifications: &[NotificationRecord],
    ) -> Result<(), CoreError>;

    /// Record the immediate outcome of one delivery call.
    ///
    /// Runs in its own transaction so neighbouring task outcomes are
    /// unaffected.
    async fn update_notification_send_result(
        &self,
        notification_id: Uuid,
        status: &str,
        provider_notification_id: Option<&str>,
    ) -> Result<(), CoreError>;

    /// Non-terminal, already-sent notifications newer than `since`,
    /// optionally scoped to one worker run.
    async fn list_unreconciled_notifications(
        &self,
        since: DateTime<Utc>,
        job_name: Option<&str>,
    ) -> Result<Vec<NotificationRecord>, CoreError>;

    /// Bulk-update a group of notifications to a provider status.
    async fn update_notification_statuses(
        &self,
        notification_ids: &[Uuid],
        status: &str,
    ) -> Result<u64, CoreError>;

    // ========================================================================
    // Audit facts
    // ========================================================================

    async fn insert_audit_event(&self, event: &AuditEventRecord) -> Result<(), CoreError>;

    // ========================================================================
    // Health
    // ========================================================================

    async fn health_check_db(&self) -> Result<bool, CoreError>;
}

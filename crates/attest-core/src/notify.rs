// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Notification orchestration.
//!
//! Translates one domain event into a published message plus zero or more
//! per-recipient notification tasks. The domain event is the system of
//! record for external consumers, so it is published first and
//! unconditionally; contact lookup and delivery failures never undo it.
//!
//! Delivery isolation: the whole task batch is persisted as `pending` in
//! one transaction, then each task is sent and its record updated in its
//! own transaction immediately after the send. A failure on task #2 of 3
//! leaves #1 and #3 untouched.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{DomainEvent, DomainEventMessage, NotificationMethod, RecipientType};
use crate::error::Result;
use crate::gateways::{CaseDirectory, ContactDetails, EventPublisher, NotifyGateway};
use crate::persistence::{
    AuditEventRecord, CheckinRecord, NotificationRecord, OffenderRecord, Persistence,
};

/// Which recipients an event fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    /// Offender channels plus the practitioner email.
    OffenderAndPractitioner,
    /// Offender channels only (reminders).
    OffenderOnly,
    /// Practitioner email only (expiry notices).
    PractitionerOnly,
    /// Publish the domain event without building notification tasks.
    PublishOnly,
}

/// Channel enablement and template configuration.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    /// Send SMS to offenders.
    pub offender_sms_enabled: bool,
    /// Send email to offenders.
    pub offender_email_enabled: bool,
    /// Send email to practitioners.
    pub practitioner_email_enabled: bool,
    /// Provider template for offender SMS.
    pub offender_sms_template_id: String,
    /// Provider template for offender email.
    pub offender_email_template_id: String,
    /// Provider template for practitioner email.
    pub practitioner_email_template_id: String,
    /// Base URL for event detail links.
    pub detail_base_url: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            offender_sms_enabled: true,
            offender_email_enabled: true,
            practitioner_email_enabled: true,
            offender_sms_template_id: "offender-sms".to_string(),
            offender_email_template_id: "offender-email".to_string(),
            practitioner_email_template_id: "practitioner-email".to_string(),
            detail_base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Outcome counters for one orchestration call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifySummary {
    /// Notifications sent successfully.
    pub sent: usize,
    /// Notifications whose delivery call failed.
    pub failed: usize,
    /// Enabled channels with no recipient data.
    pub undeliverable: usize,
}

/// Orchestrates domain event publication and notification delivery.
pub struct NotificationOrchestrator {
    persistence: Arc<dyn Persistence>,
    case_directory: Arc<dyn CaseDirectory>,
    gateway: Arc<dyn NotifyGateway>,
    publisher: Arc<dyn EventPublisher>,
    settings: NotificationSettings,
}

impl NotificationOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        case_directory: Arc<dyn CaseDirectory>,
        gateway: Arc<dyn NotifyGateway>,
        publisher: Arc<dyn EventPublisher>,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            persistence,
            case_directory,
            gateway,
            publisher,
            settings,
        }
    }

    /// Handle one domain event end to end.
    ///
    /// `contact` may be pre-fetched (batch worker paths); when absent it is
    /// looked up here, and a lookup failure degrades to "no data" rather
    /// than failing the event.
    pub async fn notify(
        &self,
        event: DomainEvent,
        offender: &OffenderRecord,
        checkin: Option<&CheckinRecord>,
        contact: Option<ContactDetails>,
        recipients: Recipients,
        job_name: Option<&str>,
    ) -> Result<NotifySummary> {
        // 1. The published event is the system of record; failures are
        //    logged and swallowed so delivery trouble cannot suppress it.
        self.publish_event(event, offender, checkin).await;

        if recipients == Recipients::PublishOnly {
            return Ok(NotifySummary::default());
        }

        // 2. Resolve contact details, degrading to None on gateway failure.
        let contact = match contact {
            Some(details) => Some(details),
            None => match self.case_directory.get_case(&offender.case_reference).await {
                Ok(details) => details,
                Err(e) => {
                    warn!(
                        offender_id = %offender.id,
                        error = %e,
                        "Contact lookup failed, treating as missing"
                    );
                    None
                }
            },
        };

        // 3. Build tasks for every enabled channel that has recipient data;
        //    enabled channels without data become undeliverable audit facts.
        let (tasks, undeliverable) = self.build_tasks(event, offender, checkin, contact.as_ref(), recipients, job_name);

        if !undeliverable.is_empty() {
            self.record_undeliverable(offender, checkin, &undeliverable)
                .await;
        }

        if tasks.is_empty() {
            debug!(
                offender_id = %offender.id,
                event_type = event.event_type(),
                "No notification tasks to send"
            );
            return Ok(NotifySummary {
                undeliverable: undeliverable.len(),
                ..Default::default()
            });
        }

        // 4. Persist the whole batch as pending in one transaction.
        let records: Vec<NotificationRecord> = tasks.iter().map(|t| t.record.clone()).collect();
        self.persistence.insert_notifications(&records).await?;

        // 5. Send sequentially, updating each record right after its send so
        //    one failure cannot disturb its neighbours.
        let mut summary = NotifySummary {
            undeliverable: undeliverable.len(),
            ..Default::default()
        };
        for task in &tasks {
            match self
                .gateway
                .send(
                    &task.method,
                    &task.record.template_id,
                    &task.personalisation,
                    &task.record.reference,
                )
                .await
            {
                Ok(provider_id) => {
                    self.persistence
                        .update_notification_send_result(task.record.id, "sent", Some(&provider_id))
                        .await?;
                    summary.sent += 1;
                }
                Err(e) => {
                    warn!(
                        notification_id = %task.record.id,
                        channel = %task.record.channel,
                        error = %e,
                        "Notification send failed"
                    );
                    self.persistence
                        .update_notification_send_result(task.record.id, "failed", None)
                        .await?;
                    summary.failed += 1;
                }
            }
        }

        info!(
            offender_id = %offender.id,
            event_type = event.event_type(),
            sent = summary.sent,
            failed = summary.failed,
            undeliverable = summary.undeliverable,
            "Notification fan-out completed"
        );

        Ok(summary)
    }

    /// Publish the domain event message, logging and swallowing failures.
    async fn publish_event(
        &self,
        event: DomainEvent,
        offender: &OffenderRecord,
        checkin: Option<&CheckinRecord>,
    ) {
        let detail_url = match checkin {
            Some(checkin) => format!("{}/checkins/{}", self.settings.detail_base_url, checkin.id),
            None => format!("{}/offenders/{}", self.settings.detail_base_url, offender.id),
        };
        let message = DomainEventMessage::new(
            event,
            detail_url,
            Utc::now(),
            offender.case_reference.clone(),
        );

        if let Err(e) = self.publisher.publish(&message).await {
            warn!(
                event_type = event.event_type(),
                case_reference = %offender.case_reference,
                error = %e,
                "Domain event publish failed (swallowed)"
            );
        }
    }

    fn build_tasks(
        &self,
        event: DomainEvent,
        offender: &OffenderRecord,
        checkin: Option<&CheckinRecord>,
        contact: Option<&ContactDetails>,
        recipients: Recipients,
        job_name: Option<&str>,
    ) -> (Vec<NotificationTask>, Vec<&'static str>) {
        let mut tasks = Vec::new();
        let mut undeliverable = Vec::new();

        let offender_channels = matches!(
            recipients,
            Recipients::OffenderAndPractitioner | Recipients::OffenderOnly
        );
        let practitioner_channel = matches!(
            recipients,
            Recipients::OffenderAndPractitioner | Recipients::PractitionerOnly
        );

        let personalisation = self.personalisation(offender, checkin, contact);

        if offender_channels && self.settings.offender_sms_enabled {
            match contact.and_then(|c| c.phone.clone()) {
                Some(phone) => tasks.push(NotificationTask::new(
                    event,
                    RecipientType::Offender,
                    NotificationMethod::Sms(phone),
                    &self.settings.offender_sms_template_id,
                    personalisation.clone(),
                    offender,
                    checkin,
                    job_name,
                )),
                None => undeliverable.push("offender-sms"),
            }
        }

        if offender_channels && self.settings.offender_email_enabled {
            match contact.and_then(|c| c.email.clone()) {
                Some(address) => tasks.push(NotificationTask::new(
                    event,
                    RecipientType::Offender,
                    NotificationMethod::Email(address),
                    &self.settings.offender_email_template_id,
                    personalisation.clone(),
                    offender,
                    checkin,
                    job_name,
                )),
                None => undeliverable.push("offender-email"),
            }
        }

        if practitioner_channel && self.settings.practitioner_email_enabled {
            match contact.and_then(|c| c.practitioner_email.clone()) {
                Some(address) => tasks.push(NotificationTask::new(
                    event,
                    RecipientType::Practitioner,
                    NotificationMethod::Email(address),
                    &self.settings.practitioner_email_template_id,
                    personalisation,
                    offender,
                    checkin,
                    job_name,
                )),
                None => undeliverable.push("practitioner-email"),
            }
        }

        (tasks, undeliverable)
    }

    fn personalisation(
        &self,
        offender: &OffenderRecord,
        checkin: Option<&CheckinRecord>,
        contact: Option<&ContactDetails>,
    ) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(
            "name".to_string(),
            contact
                .map(|c| c.name.clone())
                .unwrap_or_else(|| offender.case_reference.clone()),
        );
        map.insert(
            "case_reference".to_string(),
            offender.case_reference.clone(),
        );
        if let Some(checkin) = checkin {
            map.insert("due_date".to_string(), checkin.due_date.to_string());
        }
        map
    }

    /// Record enabled-but-undeliverable channels as an audit fact.
    ///
    /// The fact carries a non-null "who for" even though no address was
    /// available for the listed channels.
    async fn record_undeliverable(
        &self,
        offender: &OffenderRecord,
        checkin: Option<&CheckinRecord>,
        channels: &[&'static str],
    ) {
        let detail = format!("undeliverable: {}", channels.join(", "));
        let fact = AuditEventRecord {
            id: None,
            event_type: "notification-undeliverable".to_string(),
            offender_id: offender.id,
            checkin_id: checkin.map(|c| c.id),
            practitioner_id: Some(offender.practitioner_id.clone()),
            time_to_submit_secs: None,
            time_to_review_secs: None,
            detail: Some(detail),
            created_at: Utc::now(),
        };
        if let Err(e) = self.persistence.insert_audit_event(&fact).await {
            warn!(
                offender_id = %offender.id,
                error = %e,
                "Failed to record undeliverable audit fact"
            );
        }
    }
}

/// One notification to deliver, paired with its pending record.
struct NotificationTask {
    method: NotificationMethod,
    personalisation: HashMap<String, String>,
    record: NotificationRecord,
}

impl NotificationTask {
    #[allow(clippy::too_many_arguments)]
    fn new(
        event: DomainEvent,
        recipient_type: RecipientType,
        method: NotificationMethod,
        template_id: &str,
        personalisation: HashMap<String, String>,
        offender: &OffenderRecord,
        checkin: Option<&CheckinRecord>,
        job_name: Option<&str>,
    ) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        // The provider-side reference groups a worker batch; ad-hoc sends
        // fall back to the notification id.
        let reference = job_name
            .map(|j| j.to_string())
            .unwrap_or_else(|| id.to_string());
        let record = NotificationRecord {
            id,
            event_type: event.event_type().to_string(),
            recipient_type: recipient_type.as_str().to_string(),
            channel: method.channel().to_string(),
            provider_notification_id: None,
            status: "pending".to_string(),
            reference,
            template_id: template_id.to_string(),
            offender_id: Some(offender.id),
            checkin_id: checkin.map(|c| c.id),
            job_name: job_name.map(|j| j.to_string()),
            created_at: now,
            updated_at: now,
        };
        Self {
            method,
            personalisation,
            record,
        }
    }
}

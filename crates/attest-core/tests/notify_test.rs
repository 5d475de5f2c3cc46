// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the notification orchestrator.

mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use attest_core::domain::DomainEvent;
use attest_core::gateways::ContactDetails;
use attest_core::notify::{
    NotificationOrchestrator, NotificationSettings, Recipients,
};
use attest_core::persistence::{Persistence, PostgresPersistence};

use common::{
    FakeCaseDirectory, RecordingNotifyGateway, RecordingPublisher, contact_for, seed_offender,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct NotifyHarness {
    pool: PgPool,
    orchestrator: NotificationOrchestrator,
    gateway: Arc<RecordingNotifyGateway>,
    publisher: Arc<RecordingPublisher>,
}

fn build(pool: PgPool, gateway: RecordingNotifyGateway, publisher: RecordingPublisher) -> NotifyHarness {
    let persistence: Arc<dyn Persistence> = Arc::new(PostgresPersistence::new(pool.clone()));
    let gateway = Arc::new(gateway);
    let publisher = Arc::new(publisher);
    let orchestrator = NotificationOrchestrator::new(
        persistence,
        Arc::new(FakeCaseDirectory::accepting()),
        gateway.clone(),
        publisher.clone(),
        NotificationSettings::default(),
    );
    NotifyHarness {
        pool,
        orchestrator,
        gateway,
        publisher,
    }
}

async fn notification_statuses(pool: &PgPool, offender_id: Uuid) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT status FROM notifications WHERE offender_id = $1 ORDER BY channel, recipient_type",
    )
    .bind(offender_id)
    .fetch_all(pool)
    .await
    .expect("status query should succeed")
}

#[tokio::test]
async fn failure_on_second_send_isolates_neighbours() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build(
        pool,
        RecordingNotifyGateway::failing_on(2),
        RecordingPublisher::default(),
    );
    let offender = seed_offender(&harness.pool, date(2032, 1, 5), 7, true).await;

    let summary = harness
        .orchestrator
        .notify(
            DomainEvent::CheckinCreated,
            &offender,
            None,
            Some(contact_for(&offender.case_reference)),
            Recipients::OffenderAndPractitioner,
            None,
        )
        .await
        .expect("orchestration should not fail on a send failure");

    assert_eq!(summary.sent, 2);
    assert_eq!(summary.failed, 1);

    let statuses = notification_statuses(&harness.pool, offender.id).await;
    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses.iter().filter(|s| *s == "sent").count(), 2);
    assert_eq!(statuses.iter().filter(|s| *s == "failed").count(), 1);
    assert!(!statuses.iter().any(|s| s == "pending"));
}

#[tokio::test]
async fn missing_recipient_data_is_undeliverable_not_an_error() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build(
        pool,
        RecordingNotifyGateway::default(),
        RecordingPublisher::default(),
    );
    let offender = seed_offender(&harness.pool, date(2032, 1, 12), 7, true).await;

    let contact = ContactDetails {
        phone: None,
        ..contact_for(&offender.case_reference)
    };

    let summary = harness
        .orchestrator
        .notify(
            DomainEvent::CheckinCreated,
            &offender,
            None,
            Some(contact),
            Recipients::OffenderAndPractitioner,
            None,
        )
        .await
        .expect("orchestration should succeed");

    assert_eq!(summary.sent, 2);
    assert_eq!(summary.undeliverable, 1);

    let undeliverable: Option<String> = sqlx::query_scalar(
        "SELECT detail FROM audit_events
         WHERE offender_id = $1 AND event_type = 'notification-undeliverable'",
    )
    .bind(offender.id)
    .fetch_optional(&harness.pool)
    .await
    .expect("audit query should succeed")
    .flatten();
    assert_eq!(undeliverable.as_deref(), Some("undeliverable: offender-sms"));
}

#[tokio::test]
async fn publish_failure_never_blocks_delivery() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build(
        pool,
        RecordingNotifyGateway::default(),
        RecordingPublisher::failing(),
    );
    let offender = seed_offender(&harness.pool, date(2032, 1, 19), 7, true).await;

    let summary = harness
        .orchestrator
        .notify(
            DomainEvent::CheckinSubmitted,
            &offender,
            None,
            Some(contact_for(&offender.case_reference)),
            Recipients::OffenderAndPractitioner,
            None,
        )
        .await
        .expect("orchestration should swallow publish failure");

    assert_eq!(summary.sent, 3);
    assert_eq!(harness.gateway.sends().len(), 3);
}

#[tokio::test]
async fn practitioner_only_events_skip_offender_channels() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build(
        pool,
        RecordingNotifyGateway::default(),
        RecordingPublisher::default(),
    );
    let offender = seed_offender(&harness.pool, date(2032, 1, 26), 7, true).await;

    let summary = harness
        .orchestrator
        .notify(
            DomainEvent::CheckinExpired,
            &offender,
            None,
            Some(contact_for(&offender.case_reference)),
            Recipients::PractitionerOnly,
            Some("checkin-expiry"),
        )
        .await
        .expect("orchestration should succeed");

    assert_eq!(summary.sent, 1);
    let sends = harness.gateway.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].channel, "email");
    assert_eq!(sends[0].destination, "po@example.com");
    // Worker-produced notifications carry the job name as provider reference.
    assert_eq!(sends[0].reference, "checkin-expiry");
}

#[tokio::test]
async fn publish_only_builds_no_tasks() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build(
        pool,
        RecordingNotifyGateway::default(),
        RecordingPublisher::default(),
    );
    let offender = seed_offender(&harness.pool, date(2032, 2, 2), 7, true).await;

    let summary = harness
        .orchestrator
        .notify(
            DomainEvent::CheckinReviewedAfterSubmission,
            &offender,
            None,
            None,
            Recipients::PublishOnly,
            None,
        )
        .await
        .expect("orchestration should succeed");

    assert_eq!(summary.sent, 0);
    assert!(harness.gateway.sends().is_empty());
    assert_eq!(harness.publisher.events().len(), 1);
    assert_eq!(
        harness.publisher.events()[0].event_type,
        "reviewed-after-submission"
    );
}

#[tokio::test]
async fn missing_contact_details_mark_every_enabled_channel() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let persistence: Arc<dyn Persistence> =
        Arc::new(PostgresPersistence::new(pool.clone()));
    let gateway = Arc::new(RecordingNotifyGateway::default());
    let publisher = Arc::new(RecordingPublisher::default());

    let offender = seed_offender(&pool, date(2032, 2, 9), 7, true).await;
    let mut directory = FakeCaseDirectory::accepting();
    directory.unknown_refs.insert(offender.case_reference.clone());

    let orchestrator = NotificationOrchestrator::new(
        persistence,
        Arc::new(directory),
        gateway.clone(),
        publisher.clone(),
        NotificationSettings::default(),
    );

    let summary = orchestrator
        .notify(
            DomainEvent::CheckinCreated,
            &offender,
            None,
            None,
            Recipients::OffenderAndPractitioner,
            None,
        )
        .await
        .expect("orchestration should succeed without contact details");

    assert_eq!(summary.sent, 0);
    assert_eq!(summary.undeliverable, 3);
    // The domain event is still the system of record.
    assert_eq!(publisher.events().len(), 1);
}

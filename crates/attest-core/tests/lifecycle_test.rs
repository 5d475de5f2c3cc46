// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the check-in lifecycle service.
//!
//! Tests run against the database named by TEST_ATTEST_DATABASE_URL and
//! skip when it is not set.

mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use attest_core::domain::{FaceMatchOutcome, StorageKey};
use attest_core::error::CoreError;
use attest_core::lifecycle::CheckinLifecycleService;
use attest_core::notify::{NotificationOrchestrator, NotificationSettings};
use attest_core::persistence::{CheckinRecord, Persistence, PostgresPersistence};

use common::{
    FakeCaseDirectory, FakeFaceVerifier, FakeObjectStore, RecordingNotifyGateway,
    RecordingPublisher, seed_offender,
};

struct Harness {
    pool: PgPool,
    persistence: Arc<dyn Persistence>,
    service: CheckinLifecycleService,
    store: Arc<FakeObjectStore>,
    gateway: Arc<RecordingNotifyGateway>,
    publisher: Arc<RecordingPublisher>,
}

fn build_harness(
    pool: PgPool,
    directory: FakeCaseDirectory,
    verifier: FakeFaceVerifier,
) -> Harness {
    let persistence: Arc<dyn Persistence> = Arc::new(PostgresPersistence::new(pool.clone()));
    let directory = Arc::new(directory);
    let store = Arc::new(FakeObjectStore::default());
    let gateway = Arc::new(RecordingNotifyGateway::default());
    let publisher = Arc::new(RecordingPublisher::default());

    let orchestrator = Arc::new(NotificationOrchestrator::new(
        persistence.clone(),
        directory.clone(),
        gateway.clone(),
        publisher.clone(),
        NotificationSettings::default(),
    ));
    let service = CheckinLifecycleService::new(
        persistence.clone(),
        directory,
        store.clone(),
        Arc::new(verifier),
        orchestrator,
        90.0,
        std::time::Duration::from_secs(900),
    );

    Harness {
        pool,
        persistence,
        service,
        store,
        gateway,
        publisher,
    }
}

fn details() -> attest_core::gateways::PersonalDetails {
    attest_core::gateways::PersonalDetails {
        first_name: "Jo".to_string(),
        last_name: "Bloggs".to_string(),
        date_of_birth: "1990-01-01".to_string(),
    }
}

async fn seed_checkin(harness: &Harness, date: NaiveDate) -> (Uuid, CheckinRecord) {
    let offender = seed_offender(&harness.pool, date, 7, true).await;
    let checkin = harness
        .persistence
        .insert_checkin_if_absent(offender.id, date)
        .await
        .expect("insert should succeed")
        .expect("checkin should be new");
    (offender.id, checkin)
}

async fn audit_count(pool: &PgPool, checkin_id: Uuid, event_type: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_events WHERE checkin_id = $1 AND event_type = $2",
    )
    .bind(checkin_id)
    .bind(event_type)
    .fetch_one(pool)
    .await
    .expect("audit count query should succeed")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn submit_requires_identity_verification() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 1, 6)).await;
    harness.store.put(&StorageKey::checkin_video(checkin.id));

    let result = harness
        .service
        .submit(checkin.id, serde_json::json!({"mood": "fine"}))
        .await;

    assert!(matches!(result, Err(CoreError::ValidationError { .. })));
    let unchanged = harness
        .persistence
        .get_checkin(checkin.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.status, "created");
}

#[tokio::test]
async fn submit_requires_uploaded_video() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 1, 13)).await;

    harness
        .service
        .verify_identity(checkin.id, &details())
        .await
        .expect("identity verification should pass");

    let result = harness
        .service
        .submit(checkin.id, serde_json::json!({}))
        .await;

    assert!(matches!(result, Err(CoreError::ValidationError { .. })));
}

#[tokio::test]
async fn full_flow_submit_then_review() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 1, 20)).await;
    harness.store.put(&StorageKey::checkin_video(checkin.id));

    harness
        .service
        .verify_identity(checkin.id, &details())
        .await
        .expect("identity verification should pass");
    harness
        .service
        .submit(checkin.id, serde_json::json!({"mood": "fine"}))
        .await
        .expect("submit should succeed");

    let submitted = harness
        .persistence
        .get_checkin(checkin.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(submitted.status, "submitted");
    assert_eq!(submitted.survey.unwrap()["mood"], "fine");

    // One submit notification build: offender sms + offender email +
    // practitioner email through the default settings.
    assert_eq!(harness.gateway.sends().len(), 3);
    assert_eq!(audit_count(&harness.pool, checkin.id, "checkin-submitted").await, 1);
    assert!(
        harness
            .publisher
            .events()
            .iter()
            .any(|e| e.event_type == "checkin-submitted")
    );

    harness
        .service
        .review(checkin.id, "all clear", Some(FaceMatchOutcome::Match))
        .await
        .expect("review should succeed");

    let reviewed = harness
        .persistence
        .get_checkin(checkin.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reviewed.status, "reviewed");
    assert_eq!(reviewed.manual_id_check.as_deref(), Some("MATCH"));
    assert_eq!(
        audit_count(&harness.pool, checkin.id, "reviewed-after-submission").await,
        1
    );

    let phases = harness
        .persistence
        .get_checkin_phases(checkin.id)
        .await
        .unwrap();
    assert!(phases.started_at.is_some());
    assert!(phases.submitted_at.is_some());
    assert!(phases.reviewed_at.is_some());
}

#[tokio::test]
async fn resubmission_is_rejected() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 1, 27)).await;
    harness.store.put(&StorageKey::checkin_video(checkin.id));

    harness
        .service
        .verify_identity(checkin.id, &details())
        .await
        .unwrap();
    harness
        .service
        .submit(checkin.id, serde_json::json!({}))
        .await
        .unwrap();

    let result = harness
        .service
        .submit(checkin.id, serde_json::json!({}))
        .await;
    assert!(matches!(
        result,
        Err(CoreError::InvalidCheckinState { .. })
    ));
}

#[tokio::test]
async fn review_requires_non_blank_note() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 2, 3)).await;

    for blank in ["", "   ", "\t\n"] {
        let result = harness.service.review(checkin.id, blank, None).await;
        assert!(
            matches!(result, Err(CoreError::ValidationError { .. })),
            "blank note {:?} must be rejected",
            blank
        );
    }
}

#[tokio::test]
async fn review_from_created_is_rejected() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 2, 10)).await;

    let result = harness.service.review(checkin.id, "note", None).await;
    assert!(matches!(
        result,
        Err(CoreError::InvalidCheckinState { .. })
    ));
}

#[tokio::test]
async fn review_after_expiry_writes_expiry_subtype() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 2, 17)).await;

    // Worker-style expiry.
    assert!(
        harness
            .persistence
            .transition_checkin(checkin.id, "created", "expired")
            .await
            .unwrap()
    );

    harness
        .service
        .review(checkin.id, "could not attend", None)
        .await
        .expect("review of expired check-in should succeed");

    assert_eq!(
        audit_count(&harness.pool, checkin.id, "reviewed-after-expiry").await,
        1
    );
    assert_eq!(
        audit_count(&harness.pool, checkin.id, "reviewed-after-submission").await,
        0
    );
}

#[tokio::test]
async fn annotation_requires_reviewed_or_expired() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 2, 24)).await;

    let result = harness.service.annotate(checkin.id, "follow up").await;
    assert!(matches!(
        result,
        Err(CoreError::InvalidCheckinState { .. })
    ));

    harness
        .persistence
        .transition_checkin(checkin.id, "created", "expired")
        .await
        .unwrap();

    harness
        .service
        .annotate(checkin.id, "spoke on the phone")
        .await
        .expect("annotation of expired check-in should succeed");

    // No state change.
    let unchanged = harness
        .persistence
        .get_checkin(checkin.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.status, "expired");
}

#[tokio::test]
async fn identity_verification_is_idempotent() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 3, 3)).await;

    harness
        .service
        .verify_identity(checkin.id, &details())
        .await
        .unwrap();
    harness
        .service
        .verify_identity(checkin.id, &details())
        .await
        .unwrap();

    let started_events: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM checkin_events WHERE checkin_id = $1 AND event_type = 'started'",
    )
    .bind(checkin.id)
    .fetch_one(&harness.pool)
    .await
    .unwrap();
    assert_eq!(started_events, 1);
}

#[tokio::test]
async fn identity_rejection_is_a_validation_failure() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::rejecting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 3, 10)).await;

    let result = harness.service.verify_identity(checkin.id, &details()).await;
    assert!(matches!(result, Err(CoreError::ValidationError { .. })));
}

#[tokio::test]
async fn face_verification_checks_preconditions_and_persists_outcome() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::NoMatch,
        },
    );
    let (offender_id, checkin) = seed_checkin(&harness, date(2031, 3, 17)).await;

    // Missing reference photo rejects before the provider call.
    let result = harness.service.verify_face(checkin.id, &[0]).await;
    assert!(matches!(result, Err(CoreError::ValidationError { .. })));

    harness.store.put(&StorageKey::reference_photo(offender_id));

    // Missing snapshot still rejects.
    let result = harness.service.verify_face(checkin.id, &[0]).await;
    assert!(matches!(result, Err(CoreError::ValidationError { .. })));

    harness.store.put(&StorageKey::checkin_snapshot(checkin.id, 0));

    let outcome = harness
        .service
        .verify_face(checkin.id, &[0])
        .await
        .expect("face verification should run");
    assert_eq!(outcome, FaceMatchOutcome::NoMatch);

    let persisted = harness
        .persistence
        .get_checkin(checkin.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(persisted.auto_id_check.as_deref(), Some("NO_MATCH"));
}

#[tokio::test]
async fn face_verification_result_is_overwritten_not_appended() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");

    // First pass: NO_MATCH.
    let harness = build_harness(
        pool.clone(),
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::NoMatch,
        },
    );
    let (offender_id, checkin) = seed_checkin(&harness, date(2031, 3, 24)).await;
    harness.store.put(&StorageKey::reference_photo(offender_id));
    harness.store.put(&StorageKey::checkin_snapshot(checkin.id, 0));
    harness.service.verify_face(checkin.id, &[0]).await.unwrap();

    // Re-record and verify again: MATCH replaces the old value.
    let harness2 = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    harness2.store.put(&StorageKey::reference_photo(offender_id));
    harness2
        .store
        .put(&StorageKey::checkin_snapshot(checkin.id, 0));
    harness2.service.verify_face(checkin.id, &[0]).await.unwrap();

    let persisted = harness2
        .persistence
        .get_checkin(checkin.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(persisted.auto_id_check.as_deref(), Some("MATCH"));
}

#[tokio::test]
async fn upload_urls_only_for_open_checkins() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let (_, checkin) = seed_checkin(&harness, date(2031, 5, 5)).await;

    let urls = harness
        .service
        .issue_upload_urls(checkin.id, 3)
        .await
        .expect("open check-ins accept uploads");
    assert!(urls.video.contains(&format!("video-{}", checkin.id)));
    assert_eq!(urls.snapshots.len(), 3);
    assert!(urls.snapshots[2].contains(&format!("snapshot-{}-2", checkin.id)));

    harness
        .persistence
        .transition_checkin(checkin.id, "created", "expired")
        .await
        .unwrap();

    let result = harness.service.issue_upload_urls(checkin.id, 1).await;
    assert!(matches!(
        result,
        Err(CoreError::InvalidCheckinState { .. })
    ));
}

#[tokio::test]
async fn setup_completion_requires_reference_photo() {
    skip_if_no_db!();
    let pool = common::get_test_pool().await.expect("pool");
    let harness = build_harness(
        pool,
        FakeCaseDirectory::accepting(),
        FakeFaceVerifier {
            outcome: FaceMatchOutcome::Match,
        },
    );
    let offender = seed_offender(&harness.pool, date(2031, 4, 1), 7, false).await;

    let result = harness.service.complete_setup(offender.id).await;
    assert!(matches!(result, Err(CoreError::ValidationError { .. })));

    harness.store.put(&StorageKey::reference_photo(offender.id));
    harness
        .service
        .complete_setup(offender.id)
        .await
        .expect("setup should complete");

    let verified = harness
        .persistence
        .get_offender(offender.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(verified.status, "verified");

    // Deactivation is reversible.
    harness.service.deactivate(offender.id).await.unwrap();
    let inactive = harness
        .persistence
        .get_offender(offender.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inactive.status, "inactive");

    harness.service.reactivate(offender.id).await.unwrap();
    let active = harness
        .persistence
        .get_offender(offender.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.status, "verified");
}

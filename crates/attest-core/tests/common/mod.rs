// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for attest-core integration tests.
//!
//! Provides in-memory gateway fakes and database helpers. Tests connect to
//! the database named by TEST_ATTEST_DATABASE_URL and skip when it is not
//! set.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use attest_core::domain::{DomainEventMessage, FaceMatchOutcome, NotificationMethod, StorageKey};
use attest_core::gateways::{
    CaseDirectory, ContactDetails, EventPublisher, FaceVerifier, GatewayError, GatewayResult,
    NotifyGateway, ObjectStore, PersonalDetails, StatusPage,
};
use attest_core::persistence::{OffenderRecord, Persistence, PostgresPersistence};

/// Get a migrated pool, or None when no test database is configured.
pub async fn get_test_pool() -> Option<PgPool> {
    let database_url = std::env::var("TEST_ATTEST_DATABASE_URL").ok()?;
    let pool = PgPool::connect(&database_url).await.ok()?;
    attest_core::migrations::run_postgres(&pool).await.ok()?;
    Some(pool)
}

/// Skip the test when TEST_ATTEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_ATTEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_ATTEST_DATABASE_URL not set");
            return;
        }
    };
}

/// Seed an offender, optionally already verified.
pub async fn seed_offender(
    pool: &PgPool,
    first_checkin: NaiveDate,
    interval_days: i32,
    verified: bool,
) -> OffenderRecord {
    let persistence = PostgresPersistence::new(pool.clone());
    let case_reference = format!("X{}", Uuid::new_v4().simple());
    let offender = persistence
        .create_offender(&case_reference, "practitioner-1", first_checkin, interval_days)
        .await
        .expect("Failed to create offender");
    if verified {
        persistence
            .update_offender_status(offender.id, "verified")
            .await
            .expect("Failed to verify offender");
        persistence
            .get_offender(offender.id)
            .await
            .expect("Failed to reload offender")
            .expect("Offender should exist")
    } else {
        offender
    }
}

/// Contact details derived from a case reference.
pub fn contact_for(case_reference: &str) -> ContactDetails {
    ContactDetails {
        case_reference: case_reference.to_string(),
        name: "Jo Bloggs".to_string(),
        phone: Some("+447700900000".to_string()),
        email: Some("jo@example.com".to_string()),
        practitioner_email: Some("po@example.com".to_string()),
    }
}

// ============================================================================
// Gateway Fakes
// ============================================================================

/// Case directory fake answering from a fixed verdict and derived details.
pub struct FakeCaseDirectory {
    /// Verdict returned by validate_details.
    pub valid: bool,
    /// References the directory does not know.
    pub unknown_refs: HashSet<String>,
}

impl FakeCaseDirectory {
    pub fn accepting() -> Self {
        Self {
            valid: true,
            unknown_refs: HashSet::new(),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            valid: false,
            unknown_refs: HashSet::new(),
        }
    }
}

#[async_trait]
impl CaseDirectory for FakeCaseDirectory {
    async fn get_case(&self, case_reference: &str) -> GatewayResult<Option<ContactDetails>> {
        if self.unknown_refs.contains(case_reference) {
            return Ok(None);
        }
        Ok(Some(contact_for(case_reference)))
    }

    async fn validate_details(
        &self,
        _case_reference: &str,
        _details: &PersonalDetails,
    ) -> GatewayResult<bool> {
        Ok(self.valid)
    }

    async fn get_cases(&self, case_references: &[String]) -> GatewayResult<Vec<ContactDetails>> {
        Ok(case_references
            .iter()
            .filter(|r| !self.unknown_refs.contains(*r))
            .map(|r| contact_for(r))
            .collect())
    }
}

/// Object store fake over a set of present keys.
#[derive(Default)]
pub struct FakeObjectStore {
    keys: Mutex<HashSet<String>>,
}

impl FakeObjectStore {
    pub fn with_keys(keys: impl IntoIterator<Item = StorageKey>) -> Self {
        Self {
            keys: Mutex::new(keys.into_iter().map(|k| k.as_str().to_string()).collect()),
        }
    }

    pub fn put(&self, key: &StorageKey) {
        self.keys.lock().unwrap().insert(key.as_str().to_string());
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn exists(&self, key: &StorageKey) -> GatewayResult<bool> {
        Ok(self.keys.lock().unwrap().contains(key.as_str()))
    }

    async fn presigned_url(&self, key: &StorageKey, _ttl: Duration) -> GatewayResult<String> {
        Ok(format!("https://storage.test/{}", key))
    }
}

/// Face verifier fake returning a fixed outcome.
pub struct FakeFaceVerifier {
    pub outcome: FaceMatchOutcome,
}

#[async_trait]
impl FaceVerifier for FakeFaceVerifier {
    async fn compare(
        &self,
        _reference: &StorageKey,
        _snapshots: &[StorageKey],
        _similarity_threshold: f32,
    ) -> GatewayResult<FaceMatchOutcome> {
        Ok(self.outcome)
    }
}

/// One recorded send.
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub channel: String,
    pub destination: String,
    pub template_id: String,
    pub reference: String,
}

/// Notify gateway fake recording sends; can fail on one send index.
#[derive(Default)]
pub struct RecordingNotifyGateway {
    sends: Mutex<Vec<SentNotification>>,
    /// 1-based index of the send that fails, counted across the gateway's
    /// lifetime.
    pub fail_on: Option<usize>,
    calls: Mutex<usize>,
}

impl RecordingNotifyGateway {
    pub fn failing_on(index: usize) -> Self {
        Self {
            fail_on: Some(index),
            ..Default::default()
        }
    }

    pub fn sends(&self) -> Vec<SentNotification> {
        self.sends.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyGateway for RecordingNotifyGateway {
    async fn send(
        &self,
        method: &NotificationMethod,
        template_id: &str,
        _personalisation: &HashMap<String, String>,
        reference: &str,
    ) -> GatewayResult<String> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.fail_on == Some(call) {
            return Err(GatewayError::Unavailable {
                service: "notify",
                details: "simulated provider outage".to_string(),
            });
        }
        self.sends.lock().unwrap().push(SentNotification {
            channel: method.channel().to_string(),
            destination: method.destination().to_string(),
            template_id: template_id.to_string(),
            reference: reference.to_string(),
        });
        Ok(format!("prov-{}", call))
    }

    async fn statuses(&self, _reference: &str, _cursor: Option<&str>) -> GatewayResult<StatusPage> {
        Ok(StatusPage {
            items: vec![],
            has_next_page: false,
            next_cursor: None,
        })
    }
}

/// Publisher fake recording every message; optionally failing.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEventMessage>>,
    pub fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<DomainEventMessage> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, message: &DomainEventMessage) -> GatewayResult<()> {
        if self.fail {
            return Err(GatewayError::Unavailable {
                service: "event-publisher",
                details: "simulated outage".to_string(),
            });
        }
        self.events.lock().unwrap().push(message.clone());
        Ok(())
    }
}

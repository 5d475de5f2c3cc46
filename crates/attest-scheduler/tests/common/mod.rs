// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for attest-scheduler integration tests.
//!
//! Tests connect to the database named by TEST_ATTEST_DATABASE_URL and
//! skip when it is not set. Core migrations and the scheduler's raw
//! schema run on every pool checkout; both are idempotent.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use attest_core::domain::{DomainEventMessage, NotificationMethod};
use attest_core::gateways::{
    CaseDirectory, ContactDetails, EventPublisher, GatewayResult, NotifyGateway, PersonalDetails,
    ProviderStatus, StatusPage,
};
use attest_core::notify::{NotificationOrchestrator, NotificationSettings};
use attest_core::persistence::{OffenderRecord, Persistence, PostgresPersistence};

/// Get a migrated pool, or None when no test database is configured.
pub async fn get_test_pool() -> Option<PgPool> {
    let database_url = std::env::var("TEST_ATTEST_DATABASE_URL").ok()?;
    let pool = PgPool::connect(&database_url).await.ok()?;
    attest_core::migrations::run_postgres(&pool).await.ok()?;
    sqlx::raw_sql(include_str!("../../migrations/schema.sql"))
        .execute(&pool)
        .await
        .ok()?;
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

/// Insert a completed job-log row with an explicit start date.
pub async fn seed_completed_job_run(pool: &PgPool, job_name: &str, date: NaiveDate) {
    sqlx::query(
        r#"
        INSERT INTO job_log (job_name, started_at, finished_at)
        VALUES ($1, $2::date + INTERVAL '6 hours', $2::date + INTERVAL '6 hours 5 minutes')
        "#,
    )
    .bind(job_name)
    .bind(date)
    .execute(pool)
    .await
    .expect("Failed to seed job log row");
}

/// Count check-ins for one offender.
pub async fn checkin_count(pool: &PgPool, offender_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM checkins WHERE offender_id = $1")
        .bind(offender_id)
        .fetch_one(pool)
        .await
        .expect("checkin count query should succeed")
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

/// Build an orchestrator over fakes, returning the gateway for assertions.
pub fn build_orchestrator(
    pool: &PgPool,
    directory: Arc<FakeCaseDirectory>,
) -> (Arc<NotificationOrchestrator>, Arc<RecordingNotifyGateway>) {
    let persistence: Arc<dyn Persistence> = Arc::new(PostgresPersistence::new(pool.clone()));
    let gateway = Arc::new(RecordingNotifyGateway::default());
    let orchestrator = Arc::new(NotificationOrchestrator::new(
        persistence,
        directory,
        gateway.clone(),
        Arc::new(NullPublisher),
        NotificationSettings::default(),
    ));
    (orchestrator, gateway)
}

// ============================================================================
// Gateway Fakes
// ============================================================================

/// Case directory fake answering with derived details.
#[derive(Default)]
pub struct FakeCaseDirectory {
    /// References the directory does not know.
    pub unknown_refs: HashSet<String>,
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
        Ok(true)
    }

    async fn get_cases(&self, case_references: &[String]) -> GatewayResult<Vec<ContactDetails>> {
        Ok(case_references
            .iter()
            .filter(|r| !self.unknown_refs.contains(*r))
            .map(|r| contact_for(r))
            .collect())
    }
}

/// Notify gateway fake recording sends.
#[derive(Default)]
pub struct RecordingNotifyGateway {
    sends: Mutex<Vec<(String, String)>>,
    calls: Mutex<usize>,
}

impl RecordingNotifyGateway {
    /// Recorded (channel, reference) pairs.
    pub fn sends(&self) -> Vec<(String, String)> {
        self.sends.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyGateway for RecordingNotifyGateway {
    async fn send(
        &self,
        method: &NotificationMethod,
        _template_id: &str,
        _personalisation: &HashMap<String, String>,
        reference: &str,
    ) -> GatewayResult<String> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        self.sends
            .lock()
            .unwrap()
            .push((method.channel().to_string(), reference.to_string()));
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

/// Paginated status fake: serves per-reference status lists in fixed-size
/// pages and records which references were queried.
pub struct FakeStatusGateway {
    statuses: HashMap<String, Vec<ProviderStatus>>,
    page_size: usize,
    queried: Mutex<Vec<String>>,
}

impl FakeStatusGateway {
    pub fn new(statuses: HashMap<String, Vec<ProviderStatus>>, page_size: usize) -> Self {
        Self {
            statuses,
            page_size,
            queried: Mutex::new(Vec::new()),
        }
    }

    /// References that were looked up, in order.
    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyGateway for FakeStatusGateway {
    async fn send(
        &self,
        _method: &NotificationMethod,
        _template_id: &str,
        _personalisation: &HashMap<String, String>,
        _reference: &str,
    ) -> GatewayResult<String> {
        Ok("unused".to_string())
    }

    async fn statuses(&self, reference: &str, cursor: Option<&str>) -> GatewayResult<StatusPage> {
        self.queried.lock().unwrap().push(reference.to_string());

        let all = self.statuses.get(reference).cloned().unwrap_or_default();
        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (offset + self.page_size).min(all.len());
        let items = all[offset.min(all.len())..end].to_vec();
        let has_next_page = end < all.len();

        Ok(StatusPage {
            items,
            has_next_page,
            next_cursor: has_next_page.then(|| end.to_string()),
        })
    }
}

/// Publisher that drops everything.
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish(&self, _message: &DomainEventMessage) -> GatewayResult<()> {
        Ok(())
    }
}

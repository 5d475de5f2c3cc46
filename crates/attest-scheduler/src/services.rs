// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service wiring.
//!
//! Builds the gateway clients, the notification orchestrator, and the
//! lifecycle/creation services from one [`Config`]. The scheduler binary
//! uses this for its workers; an embedding application (the HTTP layer
//! lives outside this workspace) uses the same context for the
//! interactive operations, so both sides share one set of explicitly
//! constructed, process-bounded gateway instances.

use std::sync::Arc;

use sqlx::PgPool;

use attest_clients::{
    CaseDirectoryClient, CircuitConfig, FaceCompareClient, HttpEventPublisher, NotifyClient,
    ObjectStoreClient, RetryPolicy,
};
use attest_core::creation::CheckinCreationService;
use attest_core::gateways::{
    CaseDirectory, EventPublisher, FaceVerifier, NotifyGateway, ObjectStore,
};
use attest_core::lifecycle::CheckinLifecycleService;
use attest_core::notify::{NotificationOrchestrator, NotificationSettings};
use attest_core::persistence::{Persistence, PostgresPersistence};

use crate::config::Config;
use crate::error::Result;

/// Shared services built from configuration.
pub struct ServiceContext {
    /// Persistence backend.
    pub persistence: Arc<dyn Persistence>,
    /// Case directory gateway.
    pub case_directory: Arc<dyn CaseDirectory>,
    /// Notification delivery gateway.
    pub notify_gateway: Arc<dyn NotifyGateway>,
    /// Object storage gateway.
    pub object_store: Arc<dyn ObjectStore>,
    /// Facial verification gateway.
    pub face_verifier: Arc<dyn FaceVerifier>,
    /// Domain event publisher.
    pub publisher: Arc<dyn EventPublisher>,
    /// Notification orchestrator.
    pub orchestrator: Arc<NotificationOrchestrator>,
    /// Interactive lifecycle service.
    pub lifecycle: Arc<CheckinLifecycleService>,
    /// Check-in creation service.
    pub creation: Arc<CheckinCreationService>,
}

impl ServiceContext {
    /// Wire every service from `config` over `pool`.
    pub fn from_config(pool: PgPool, config: &Config) -> Result<Self> {
        let persistence: Arc<dyn Persistence> = Arc::new(PostgresPersistence::new(pool));

        let case_directory: Arc<dyn CaseDirectory> = Arc::new(CaseDirectoryClient::new(
            config.case_directory_url.clone(),
            config.case_directory_api_key.clone(),
            config.client_timeout,
            RetryPolicy::default(),
            CircuitConfig::default(),
        )?);
        let notify_gateway: Arc<dyn NotifyGateway> = Arc::new(NotifyClient::new(
            config.notify_url.clone(),
            config.notify_api_key.clone(),
            config.client_timeout,
            config.notify_requests_per_minute,
        )?);
        let object_store: Arc<dyn ObjectStore> = Arc::new(ObjectStoreClient::new(
            config.object_store_url.clone(),
            config.object_store_api_key.clone(),
            config.client_timeout,
        )?);
        let face_verifier: Arc<dyn FaceVerifier> = Arc::new(FaceCompareClient::new(
            config.face_url.clone(),
            config.face_api_key.clone(),
            config.client_timeout,
            RetryPolicy::default(),
        )?);
        let publisher: Arc<dyn EventPublisher> = Arc::new(HttpEventPublisher::new(
            config.events_endpoint.clone(),
            config.client_timeout,
        )?);

        let settings = NotificationSettings {
            offender_sms_enabled: config.offender_sms_enabled,
            offender_email_enabled: config.offender_email_enabled,
            practitioner_email_enabled: config.practitioner_email_enabled,
            detail_base_url: config.detail_base_url.clone(),
            ..Default::default()
        };
        let orchestrator = Arc::new(NotificationOrchestrator::new(
            persistence.clone(),
            case_directory.clone(),
            notify_gateway.clone(),
            publisher.clone(),
            settings,
        ));

        let lifecycle = Arc::new(CheckinLifecycleService::new(
            persistence.clone(),
            case_directory.clone(),
            object_store.clone(),
            face_verifier.clone(),
            orchestrator.clone(),
            config.face_similarity_threshold,
            config.upload_url_ttl,
        ));
        let creation = Arc::new(CheckinCreationService::new(persistence.clone()));

        Ok(Self {
            persistence,
            case_directory,
            notify_gateway,
            object_store,
            face_verifier,
            publisher,
            orchestrator,
            lifecycle,
            creation,
        })
    }
}

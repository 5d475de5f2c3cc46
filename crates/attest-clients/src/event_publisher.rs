// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain event publisher.
//!
//! Posts one JSON message per lifecycle event to the configured events
//! endpoint. The orchestrator logs and swallows publish failures, so this
//! client only has to report them truthfully.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use attest_core::domain::DomainEventMessage;
use attest_core::gateways::{EventPublisher, GatewayError, GatewayResult};

const SERVICE: &str = "event-publisher";

/// HTTP publisher for outbound domain events.
pub struct HttpEventPublisher {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpEventPublisher {
    /// Create a new publisher posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable {
                service: SERVICE,
                details: format!("client init: {}", e),
            })?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, message: &DomainEventMessage) -> GatewayResult<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(message)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable {
                service: SERVICE,
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Unavailable {
                service: SERVICE,
                details: format!("status {}", status),
            });
        }

        debug!(event_type = %message.event_type, "Domain event published");
        Ok(())
    }
}

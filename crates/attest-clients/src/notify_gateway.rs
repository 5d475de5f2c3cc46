// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Notification delivery client.
//!
//! Sends a single SMS or email through the delivery provider and polls
//! delivery status by reference, paginated at the provider's page size
//! (~250). A local token-bucket limiter is awaited before every send to
//! respect the provider's requests-per-minute ceiling; this blocks the
//! sending task, not the rest of a worker's pipeline.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use attest_core::domain::NotificationMethod;
use attest_core::gateways::{
    GatewayError, GatewayResult, NotifyGateway, ProviderStatus, StatusPage,
};

const SERVICE: &str = "notify";

/// HTTP client for the notification delivery API.
pub struct NotifyClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: DefaultDirectRateLimiter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_address: Option<&'a str>,
    template_id: &'a str,
    personalisation: &'a HashMap<String, String>,
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusItem {
    id: String,
    reference: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    notifications: Vec<StatusItem>,
    has_next_page: bool,
    next_cursor: Option<String>,
}

impl NotifyClient {
    /// Create a new client limited to `requests_per_minute` sends.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        requests_per_minute: u32,
    ) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable {
                service: SERVICE,
                details: format!("client init: {}", e),
            })?;

        let rpm = NonZeroU32::new(requests_per_minute.max(1))
            .unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
        })
    }
}

#[async_trait]
impl NotifyGateway for NotifyClient {
    async fn send(
        &self,
        method: &NotificationMethod,
        template_id: &str,
        personalisation: &HashMap<String, String>,
        reference: &str,
    ) -> GatewayResult<String> {
        // Honor the provider ceiling before the request leaves the process.
        self.limiter.until_ready().await;

        let (endpoint, body) = match method {
            NotificationMethod::Sms(phone) => (
                "sms",
                SendRequest {
                    phone_number: Some(phone),
                    email_address: None,
                    template_id,
                    personalisation,
                    reference,
                },
            ),
            NotificationMethod::Email(address) => (
                "email",
                SendRequest {
                    phone_number: None,
                    email_address: Some(address),
                    template_id,
                    personalisation,
                    reference,
                },
            ),
        };

        let url = format!("{}/v2/notifications/{}", self.base_url, endpoint);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable {
                service: SERVICE,
                details: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(GatewayError::Rejected {
                service: SERVICE,
                reason: format!("status {}", status),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::Unavailable {
                service: SERVICE,
                details: format!("status {}", status),
            });
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable {
                service: SERVICE,
                details: format!("decode: {}", e),
            })?;

        debug!(
            provider_id = %sent.id,
            channel = method.channel(),
            reference,
            "Notification accepted by provider"
        );

        Ok(sent.id)
    }

    async fn statuses(&self, reference: &str, cursor: Option<&str>) -> GatewayResult<StatusPage> {
        let mut request = self
            .http
            .get(format!("{}/v2/notifications", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("reference", reference)]);
        if let Some(cursor) = cursor {
            request = request.query(&[("olderThan", cursor)]);
        }

        let response = request.send().await.map_err(|e| GatewayError::Unavailable {
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

        let page: StatusResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable {
                service: SERVICE,
                details: format!("decode: {}", e),
            })?;

        Ok(StatusPage {
            items: page
                .notifications
                .into_iter()
                .map(|item| ProviderStatus {
                    id: item.id,
                    reference: item.reference,
                    status: item.status,
                })
                .collect(),
            has_next_page: page.has_next_page,
            next_cursor: page.next_cursor,
        })
    }
}

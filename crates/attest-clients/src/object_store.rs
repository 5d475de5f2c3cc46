// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object storage gateway client.
//!
//! Existence checks and presigned URL issuance per object key. Upload and
//! download mechanics are out of scope; this client only addresses objects
//! through the stable `{entity}-{uuid}[-{index}]` key scheme.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use attest_core::domain::StorageKey;
use attest_core::gateways::{GatewayError, GatewayResult, ObjectStore};

const SERVICE: &str = "object-store";

/// HTTP client for the object storage gateway.
pub struct ObjectStoreClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignRequest {
    ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
struct PresignResponse {
    url: String,
}

impl ObjectStoreClient {
    /// Create a new client against `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable {
                service: SERVICE,
                details: format!("client init: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ObjectStore for ObjectStoreClient {
    async fn exists(&self, key: &StorageKey) -> GatewayResult<bool> {
        let url = format!("{}/objects/{}", self.base_url, key);
        let response = self
            .http
            .head(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable {
                service: SERVICE,
                details: e.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => Err(GatewayError::Unavailable {
                service: SERVICE,
                details: format!("status {}", status),
            }),
        }
    }

    async fn presigned_url(&self, key: &StorageKey, ttl: Duration) -> GatewayResult<String> {
        let url = format!("{}/objects/{}/presign", self.base_url, key);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&PresignRequest {
                ttl_secs: ttl.as_secs(),
            })
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable {
                service: SERVICE,
                details: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound { service: SERVICE });
        }
        if !status.is_success() {
            return Err(GatewayError::Unavailable {
                service: SERVICE,
                details: format!("status {}", status),
            });
        }

        let presigned: PresignResponse =
            response
                .json()
                .await
                .map_err(|e| GatewayError::Unavailable {
                    service: SERVICE,
                    details: format!("decode: {}", e),
                })?;

        Ok(presigned.url)
    }
}

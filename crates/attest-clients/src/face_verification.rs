// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Facial verification client.
//!
//! Issues one asynchronous compare-faces call per request and maps the
//! provider's match list into exactly one [`FaceMatchOutcome`]:
//! no face found → NO_FACE_DETECTED; matches present at or above the
//! threshold → MATCH; below threshold or empty → NO_MATCH; a
//! provider-reported processing failure → ERROR. Transport failures after
//! retries surface as `GatewayError::Unavailable` instead, so callers can
//! distinguish "the provider said error" from "we never got an answer".

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use attest_core::domain::{FaceMatchOutcome, StorageKey};
use attest_core::gateways::{FaceVerifier, GatewayError, GatewayResult};

use crate::retry::{RetryPolicy, run_with_retry};

const SERVICE: &str = "face-verification";

/// HTTP client for the facial comparison API.
pub struct FaceCompareClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareRequest<'a> {
    reference_key: &'a str,
    snapshot_keys: Vec<&'a str>,
    similarity_threshold: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FaceMatch {
    similarity: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareResponse {
    face_detected: bool,
    #[serde(default)]
    face_matches: Vec<FaceMatch>,
    #[serde(default)]
    error: Option<String>,
}

/// Map one provider response to the single outcome the core persists.
fn map_response(response: &CompareResponse, threshold: f32) -> FaceMatchOutcome {
    if response.error.is_some() {
        return FaceMatchOutcome::Error;
    }
    if !response.face_detected {
        return FaceMatchOutcome::NoFaceDetected;
    }
    if response
        .face_matches
        .iter()
        .any(|m| m.similarity >= threshold)
    {
        FaceMatchOutcome::Match
    } else {
        FaceMatchOutcome::NoMatch
    }
}

impl FaceCompareClient {
    /// Create a new client against `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
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
            retry,
        })
    }
}

#[async_trait]
impl FaceVerifier for FaceCompareClient {
    async fn compare(
        &self,
        reference: &StorageKey,
        snapshots: &[StorageKey],
        similarity_threshold: f32,
    ) -> GatewayResult<FaceMatchOutcome> {
        let body = CompareRequest {
            reference_key: reference.as_str(),
            snapshot_keys: snapshots.iter().map(|k| k.as_str()).collect(),
            similarity_threshold,
        };
        let url = format!("{}/v1/compare", self.base_url);

        let response = run_with_retry(
            &self.retry,
            || {
                let url = url.clone();
                let body = &body;
                async move {
                    let response = self
                        .http
                        .post(&url)
                        .bearer_auth(&self.api_key)
                        .json(body)
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

                    response
                        .json::<CompareResponse>()
                        .await
                        .map_err(|e| GatewayError::Unavailable {
                            service: SERVICE,
                            details: format!("decode: {}", e),
                        })
                }
            },
            |error| matches!(error, GatewayError::Unavailable { .. }),
        )
        .await?;

        let outcome = map_response(&response, similarity_threshold);
        debug!(
            reference = %reference,
            snapshots = snapshots.len(),
            outcome = outcome.as_str(),
            "Face comparison completed"
        );

        Ok(outcome)
    }
}

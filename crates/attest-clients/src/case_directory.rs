// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Case directory client.
//!
//! Fetches and validates personal contact details by case reference.
//! Single and batched (≤500) lookups, wrapped in retry with backoff and a
//! circuit breaker. On breaker-open the call fails fast with
//! `GatewayError::CircuitOpen` so worker paths can degrade to "no data".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use attest_core::gateways::{
    CASE_DIRECTORY_MAX_BATCH, CaseDirectory, ContactDetails, GatewayError, GatewayResult,
    PersonalDetails,
};

use crate::circuit::{CircuitBreaker, CircuitConfig};
use crate::retry::{RetryPolicy, run_with_retry};

const SERVICE: &str = "case-directory";

/// HTTP client for the case directory API.
pub struct CaseDirectoryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseResponse {
    case_reference: String,
    name: String,
    phone: Option<String>,
    email: Option<String>,
    practitioner_email: Option<String>,
}

impl From<CaseResponse> for ContactDetails {
    fn from(response: CaseResponse) -> Self {
        Self {
            case_reference: response.case_reference,
            name: response.name,
            phone: response.phone,
            email: response.email,
            practitioner_email: response.practitioner_email,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest<'a> {
    case_references: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    cases: Vec<CaseResponse>,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
}

impl CaseDirectoryClient {
    /// Create a new client against `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
        circuit: CircuitConfig,
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
            breaker: CircuitBreaker::new(circuit),
        })
    }

    fn check_breaker(&self) -> GatewayResult<()> {
        if self.breaker.should_allow() {
            Ok(())
        } else {
            Err(GatewayError::CircuitOpen { service: SERVICE })
        }
    }

    fn record_outcome<T>(&self, result: &GatewayResult<T>) {
        match result {
            // Directory misses are valid answers, not provider failures.
            Ok(_) | Err(GatewayError::NotFound { .. }) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> GatewayResult<T> {
        run_with_retry(
            &self.retry,
            || {
                let url = url.clone();
                async move {
                    let response = self
                        .http
                        .get(&url)
                        .bearer_auth(&self.api_key)
                        .send()
                        .await
                        .map_err(|e| GatewayError::Unavailable {
                            service: SERVICE,
                            details: e.to_string(),
                        })?;

                    match response.status() {
                        StatusCode::NOT_FOUND => Err(GatewayError::NotFound { service: SERVICE }),
                        status if status.is_success() => {
                            response
                                .json::<T>()
                                .await
                                .map_err(|e| GatewayError::Unavailable {
                                    service: SERVICE,
                                    details: format!("decode: {}", e),
                                })
                        }
                        status => Err(GatewayError::Unavailable {
                            service: SERVICE,
                            details: format!("status {}", status),
                        }),
                    }
                }
            },
            is_retryable,
        )
        .await
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: &B,
    ) -> GatewayResult<T> {
        run_with_retry(
            &self.retry,
            || {
                let url = url.clone();
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

                    match response.status() {
                        StatusCode::NOT_FOUND => Err(GatewayError::NotFound { service: SERVICE }),
                        status if status.is_success() => {
                            response
                                .json::<T>()
                                .await
                                .map_err(|e| GatewayError::Unavailable {
                                    service: SERVICE,
                                    details: format!("decode: {}", e),
                                })
                        }
                        status if status.is_client_error() => Err(GatewayError::Rejected {
                            service: SERVICE,
                            reason: format!("status {}", status),
                        }),
                        status => Err(GatewayError::Unavailable {
                            service: SERVICE,
                            details: format!("status {}", status),
                        }),
                    }
                }
            },
            is_retryable,
        )
        .await
    }
}

/// Transport failures and 5xx responses retry; misses and rejections do not.
fn is_retryable(error: &GatewayError) -> bool {
    matches!(error, GatewayError::Unavailable { .. })
}

#[async_trait]
impl CaseDirectory for CaseDirectoryClient {
    async fn get_case(&self, case_reference: &str) -> GatewayResult<Option<ContactDetails>> {
        self.check_breaker()?;

        let url = format!("{}/cases/{}", self.base_url, case_reference);
        let result = self.get_json::<CaseResponse>(url).await;
        self.record_outcome(&result);

        match result {
            Ok(response) => Ok(Some(response.into())),
            Err(GatewayError::NotFound { .. }) => {
                debug!(case_reference, "Case not found in directory");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn validate_details(
        &self,
        case_reference: &str,
        details: &PersonalDetails,
    ) -> GatewayResult<bool> {
        self.check_breaker()?;

        let url = format!("{}/cases/{}/validate", self.base_url, case_reference);
        let result = self.post_json::<_, ValidateResponse>(url, details).await;
        self.record_outcome(&result);

        result.map(|r| r.valid)
    }

    async fn get_cases(&self, case_references: &[String]) -> GatewayResult<Vec<ContactDetails>> {
        if case_references.len() > CASE_DIRECTORY_MAX_BATCH {
            return Err(GatewayError::Rejected {
                service: SERVICE,
                reason: format!(
                    "batch of {} exceeds the {} reference limit",
                    case_references.len(),
                    CASE_DIRECTORY_MAX_BATCH
                ),
            });
        }
        if case_references.is_empty() {
            return Ok(Vec::new());
        }

        self.check_breaker()?;

        let url = format!("{}/cases/batch", self.base_url);
        let body = BatchRequest { case_references };
        let result = self.post_json::<_, BatchResponse>(url, &body).await;
        self.record_outcome(&result);

        match result {
            Ok(response) => {
                if response.cases.len() < case_references.len() {
                    // Missing references are simply absent, not an error.
                    warn!(
                        requested = case_references.len(),
                        returned = response.cases.len(),
                        "Case directory batch returned fewer cases than requested"
                    );
                }
                Ok(response.cases.into_iter().map(Into::into).collect())
            }
            Err(e) => Err(e),
        }
    }
}

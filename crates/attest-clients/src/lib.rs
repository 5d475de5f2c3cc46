// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Attest Clients - Vendor API Gateways
//!
//! HTTP implementations of the gateway traits defined in `attest-core`:
//!
//! | Client | Gateway | Resilience |
//! |--------|---------|------------|
//! | [`CaseDirectoryClient`] | case directory lookups | retry + circuit breaker |
//! | [`NotifyClient`] | notification delivery + status polling | token-bucket rate limit |
//! | [`FaceCompareClient`] | facial comparison | retry |
//! | [`ObjectStoreClient`] | existence checks + presigned URLs | per-call timeout |
//! | [`HttpEventPublisher`] | domain event output | fire-and-report |
//!
//! Every client enforces a per-call timeout; none retries a rejection.
//! Breakers and limiters are plain constructed values owned by the client
//! instance, wired in at application startup rather than ambient process
//! state.

#![deny(missing_docs)]

/// Case directory client with retry and circuit breaking.
pub mod case_directory;

/// Circuit breaker used by outbound gateways.
pub mod circuit;

/// Domain event publisher.
pub mod event_publisher;

/// Facial comparison client and outcome mapping.
pub mod face_verification;

/// Notification delivery client with local rate limiting.
pub mod notify_gateway;

/// Object storage gateway client.
pub mod object_store;

/// Retry with exponential backoff and jitter.
pub mod retry;

pub use case_directory::CaseDirectoryClient;
pub use circuit::{CircuitBreaker, CircuitConfig, CircuitState};
pub use event_publisher::HttpEventPublisher;
pub use face_verification::FaceCompareClient;
pub use notify_gateway::NotifyClient;
pub use object_store::ObjectStoreClient;
pub use retry::{RetryPolicy, run_with_retry};

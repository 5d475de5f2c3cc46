// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Attest Core - Check-in Lifecycle Engine
//!
//! This crate owns the check-in lifecycle for remote supervision: the
//! offender and check-in state machines, the creation service, the
//! notification orchestrator, and the PostgreSQL persistence layer. The
//! scheduled worker family lives in `attest-scheduler`; vendor API clients
//! live in `attest-clients`.
//!
//! # Check-in Status State Machine
//!
//! ```text
//!                    ┌─────────┐
//!        verify_identity (idempotent, stays CREATED)
//!                    │ CREATED │◄────┐
//!                    └────┬────┘     │ created by scheduler
//!                         │          │ or manual trigger
//!            submit       │          │
//!      (video + identity) │     grace window elapsed
//!                         │     (expiry worker only)
//!          ┌──────────────┤──────────────┐
//!          ▼                             ▼
//!     ┌───────────┐                ┌─────────┐
//!     │ SUBMITTED │                │ EXPIRED │──── annotate (no change)
//!     └─────┬─────┘                └────┬────┘
//!           │ review (note)             │ review ("missed" note)
//!           ▼                           ▼
//!     ┌──────────┐                ┌──────────┐
//!     │ REVIEWED │                │ REVIEWED │
//!     └──────────┘                └──────────┘
//! ```
//!
//! Reviewing writes an audit row whose type encodes the predecessor
//! (`reviewed-after-submission` vs `reviewed-after-expiry`).
//!
//! # Offender Status State Machine
//!
//! | Status | Description |
//! |--------|-------------|
//! | `initial` | Practitioner started setup; no check-ins are created |
//! | `verified` | Setup complete (reference photo held); eligible for check-ins |
//! | `inactive` | Deactivated; reversible via reactivation |
//!
//! # Phase Timestamps
//!
//! Lifecycle state is the explicit status enum; phase timestamps
//! (`started`, `submitted`, `reviewed`, `expired`, `reminded`,
//! `annotated`) are an append-only event log, never mutable nullable
//! columns. See [`persistence::CheckinPhases`].
//!
//! # Modules
//!
//! - [`domain`]: status enums, schedule arithmetic, storage keys, events
//! - [`error`]: unified error type with stable error codes
//! - [`gateways`]: traits for the case directory, notification provider,
//!   facial verification, object storage, and event publishing
//! - [`lifecycle`]: interactive state transitions
//! - [`creation`]: check-in instantiation (scheduler + manual triggers)
//! - [`notify`]: notification orchestration and delivery isolation
//! - [`persistence`]: persistence trait and PostgreSQL backend
//! - [`migrations`]: embedded schema migrations

#![deny(missing_docs)]

/// Check-in instantiation for (offender, due-date) pairs.
pub mod creation;

/// Domain model: statuses, schedule arithmetic, storage keys, events.
pub mod domain;

/// Error types for core operations with stable error codes.
pub mod error;

/// Gateway traits for external collaborators.
pub mod gateways;

/// Interactive lifecycle operations (verify, submit, review, annotate).
pub mod lifecycle;

/// Embedded database migrations.
pub mod migrations;

/// Notification orchestration and delivery-status bookkeeping.
pub mod notify;

/// Persistence trait and PostgreSQL backend.
pub mod persistence;

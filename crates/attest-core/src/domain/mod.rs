// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model for attest-core.
//!
//! Lifecycle status enums and their transition guards, the check-in
//! schedule arithmetic, the object-storage key scheme, notification
//! channel types, and the outbound domain event message.

pub mod events;
pub mod notification;
pub mod schedule;
pub mod status;
pub mod storage;

pub use self::events::{DomainEvent, DomainEventMessage, PersonReference};
pub use self::notification::{NotificationMethod, RecipientType};
pub use self::schedule::checkin_due_on;
pub use self::status::{CheckinStatus, FaceMatchOutcome, OffenderStatus};
pub use self::storage::StorageKey;

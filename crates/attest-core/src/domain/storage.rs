// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object-storage key scheme.
//!
//! Keys follow `{entity}-{uuid}`, with a trailing `-{index}` for
//! multi-snapshot keys. This scheme is the only addressing contract between
//! the core and object storage and must remain stable.

use std::fmt;

use uuid::Uuid;

/// A key addressing a single object in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Reference photo for an offender.
    pub fn reference_photo(offender_id: Uuid) -> Self {
        Self(format!("photo-{}", offender_id))
    }

    /// Submitted video for a check-in.
    pub fn checkin_video(checkin_id: Uuid) -> Self {
        Self(format!("video-{}", checkin_id))
    }

    /// Snapshot frame `index` captured during a check-in recording.
    pub fn checkin_snapshot(checkin_id: Uuid, index: u32) -> Self {
        Self(format!("snapshot-{}-{}", checkin_id, index))
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

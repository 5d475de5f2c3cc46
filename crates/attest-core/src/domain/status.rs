// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle status enums and transition guards.
//!
//! Both state machines are encoded as explicit enums with exhaustive
//! matching; phase timestamps live in the append-only check-in event log,
//! not in nullable columns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Offender lifecycle status.
///
/// `Initial` offenders are mid-setup; only `Verified` offenders receive
/// check-ins. Deactivation is reversible, so `Inactive` can move back to
/// `Verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffenderStatus {
    /// Practitioner started setup; reference photo not yet confirmed.
    Initial,
    /// Setup complete; eligible for check-in creation.
    Verified,
    /// Deactivated; no check-ins are created.
    Inactive,
}

impl OffenderStatus {
    /// Stable lowercase database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Verified => "verified",
            Self::Inactive => "inactive",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(Self::Initial),
            "verified" => Some(Self::Verified),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

impl fmt::Display for OffenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check-in lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckinStatus {
    /// Created by the scheduler or a manual trigger; awaiting submission.
    Created,
    /// Offender submitted a survey and video.
    Submitted,
    /// Practitioner completed the review.
    Reviewed,
    /// Due date plus grace window elapsed without a submission.
    Expired,
}

impl CheckinStatus {
    /// Stable lowercase database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Reviewed => "reviewed",
            Self::Expired => "expired",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "submitted" => Some(Self::Submitted),
            "reviewed" => Some(Self::Reviewed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether a submission is permitted from this status.
    pub fn can_submit(&self) -> bool {
        matches!(self, Self::Created)
    }

    /// Whether a review is permitted from this status.
    ///
    /// Both predecessors are reviewable; the review comment semantics
    /// differ by predecessor (review note vs reason-not-completed note).
    pub fn can_review(&self) -> bool {
        matches!(self, Self::Submitted | Self::Expired)
    }

    /// Whether a follow-up annotation is permitted from this status.
    pub fn can_annotate(&self) -> bool {
        matches!(self, Self::Reviewed | Self::Expired)
    }

    /// Whether the expiry worker may transition this status to `Expired`.
    pub fn can_expire(&self) -> bool {
        matches!(self, Self::Created)
    }
}

impl fmt::Display for CheckinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a facial verification comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaceMatchOutcome {
    /// Reference matched a snapshot at or above the similarity threshold.
    Match,
    /// Provider returned matches below threshold, or none at all.
    NoMatch,
    /// Provider could not find a face in the snapshot set.
    NoFaceDetected,
    /// Provider call failed after retries.
    Error,
}

impl FaceMatchOutcome {
    /// Stable database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "MATCH",
            Self::NoMatch => "NO_MATCH",
            Self::NoFaceDetected => "NO_FACE_DETECTED",
            Self::Error => "ERROR",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MATCH" => Some(Self::Match),
            "NO_MATCH" => Some(Self::NoMatch),
            "NO_FACE_DETECTED" => Some(Self::NoFaceDetected),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for FaceMatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

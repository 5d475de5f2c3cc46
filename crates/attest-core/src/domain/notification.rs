// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Notification channel types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    /// The person on probation.
    Offender,
    /// The owning practitioner.
    Practitioner,
}

impl RecipientType {
    /// Stable lowercase database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offender => "offender",
            Self::Practitioner => "practitioner",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "offender" => Some(Self::Offender),
            "practitioner" => Some(Self::Practitioner),
            _ => None,
        }
    }
}

impl fmt::Display for RecipientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivery method carrying its own destination.
///
/// Exhaustive matching on this type replaces string channel names; a method
/// cannot exist without the data needed to deliver on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationMethod {
    /// SMS to a phone number.
    Sms(String),
    /// Email to an address.
    Email(String),
}

impl NotificationMethod {
    /// Stable lowercase channel name for persistence and audit rows.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Sms(_) => "sms",
            Self::Email(_) => "email",
        }
    }

    /// The destination address (phone number or email address).
    pub fn destination(&self) -> &str {
        match self {
            Self::Sms(phone) => phone,
            Self::Email(address) => address,
        }
    }
}

impl fmt::Display for NotificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel())
    }
}

/// Provider statuses that stop further reconciliation polling.
pub const TERMINAL_DELIVERY_STATUSES: [&str; 4] = [
    "delivered",
    "permanent-failure",
    "temporary-failure",
    "technical-failure",
];

/// Whether a provider delivery status is terminal.
pub fn is_terminal_delivery_status(status: &str) -> bool {
    TERMINAL_DELIVERY_STATUSES.contains(&status)
}

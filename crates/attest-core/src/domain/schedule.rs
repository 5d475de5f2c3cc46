// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Check-in schedule arithmetic.
//!
//! An offender's schedule is the pair (`first_checkin`, `interval_days`).
//! The offender is due on `first_checkin` and on every whole multiple of
//! the interval after it, never before `first_checkin`.

use chrono::NaiveDate;

/// Whether a check-in is due on `today` for the given schedule.
///
/// Due iff `today >= first_checkin` and the day distance from
/// `first_checkin` is a whole multiple of `interval_days`.
/// A non-positive interval never produces a due date.
pub fn checkin_due_on(first_checkin: NaiveDate, interval_days: i64, today: NaiveDate) -> bool {
    if interval_days <= 0 {
        return false;
    }
    let elapsed = (today - first_checkin).num_days();
    elapsed >= 0 && elapsed % interval_days == 0
}

/// The next due date on or after `from` for the given schedule.
///
/// Returns `None` for a non-positive interval.
pub fn next_due_on_or_after(
    first_checkin: NaiveDate,
    interval_days: i64,
    from: NaiveDate,
) -> Option<NaiveDate> {
    if interval_days <= 0 {
        return None;
    }
    let elapsed = (from - first_checkin).num_days();
    if elapsed <= 0 {
        return Some(first_checkin);
    }
    let intervals = elapsed.div_euclid(interval_days)
        + if elapsed % interval_days == 0 { 0 } else { 1 };
    Some(first_checkin + chrono::Duration::days(intervals * interval_days))
}

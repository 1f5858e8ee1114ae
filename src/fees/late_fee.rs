//! Grace-aware late fee calculation.
//!
//! Money is integer cents throughout; the calculation is a pure
//! function of minutes late so the same figure appears at intake, in
//! the session view, and in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Branch policy for late returns: a free grace window, then a flat
/// hourly rate for every started hour past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateFeePolicy {
    pub grace_minutes: i64,
    pub hourly_rate_cents: i64,
}

impl Default for LateFeePolicy {
    fn default() -> Self {
        Self {
            grace_minutes: 30,
            hourly_rate_cents: 1_500,
        }
    }
}

impl LateFeePolicy {
    /// Fee in cents for a return `minutes_late` past the contractual
    /// end. Zero for early or in-grace returns; otherwise every started
    /// hour past the grace window bills at the hourly rate.
    pub fn calculate(&self, minutes_late: i64) -> i64 {
        if minutes_late <= 0 || minutes_late <= self.grace_minutes {
            return 0;
        }
        let billable_minutes = minutes_late - self.grace_minutes;
        let started_hours = (billable_minutes + 59) / 60;
        started_hours * self.hourly_rate_cents
    }

    /// Convenience over [`minutes_late`] for callers holding timestamps.
    pub fn assess(&self, end_at: DateTime<Utc>, returned_at: DateTime<Utc>) -> i64 {
        self.calculate(minutes_late(end_at, returned_at))
    }
}

/// Whole minutes between the contractual end and the actual return.
/// Negative when the vehicle came back early.
pub fn minutes_late(end_at: DateTime<Utc>, returned_at: DateTime<Utc>) -> i64 {
    returned_at.signed_duration_since(end_at).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> LateFeePolicy {
        LateFeePolicy {
            grace_minutes: 30,
            hourly_rate_cents: 1_500,
        }
    }

    #[test]
    fn early_return_costs_nothing() {
        assert_eq!(policy().calculate(-45), 0);
        assert_eq!(policy().calculate(0), 0);
    }

    #[test]
    fn grace_window_is_free_inclusive() {
        assert_eq!(policy().calculate(25), 0);
        assert_eq!(policy().calculate(30), 0);
    }

    #[test]
    fn first_minute_past_grace_bills_a_full_hour() {
        assert_eq!(policy().calculate(31), 1_500);
    }

    #[test]
    fn hundred_minutes_late_bills_two_hours() {
        // 100 - 30 grace = 70 billable minutes, rounded up to 2 hours
        // at $15/h.
        assert_eq!(policy().calculate(100), 3_000);
    }

    #[test]
    fn exact_hour_boundary_does_not_start_the_next_hour() {
        assert_eq!(policy().calculate(90), 1_500);
        assert_eq!(policy().calculate(91), 3_000);
    }

    #[test]
    fn zero_grace_policy_bills_from_the_first_minute() {
        let strict = LateFeePolicy {
            grace_minutes: 0,
            hourly_rate_cents: 2_000,
        };
        assert_eq!(strict.calculate(1), 2_000);
        assert_eq!(strict.calculate(60), 2_000);
        assert_eq!(strict.calculate(61), 4_000);
    }

    #[test]
    fn minutes_late_is_signed() {
        let end_at = Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap();
        let late = end_at + chrono::Duration::minutes(100);
        let early = end_at - chrono::Duration::minutes(10);
        assert_eq!(minutes_late(end_at, late), 100);
        assert_eq!(minutes_late(end_at, early), -10);
    }

    #[test]
    fn assess_matches_calculate() {
        let end_at = Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap();
        let returned_at = end_at + chrono::Duration::minutes(100);
        assert_eq!(policy().assess(end_at, returned_at), 3_000);
    }
}

//! Time-remaining computation and the countdown display string.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::datetime::{LocalZone, parse_timestamp};
use crate::error::CountdownResult;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

pub const COMPLETED_LABEL: &str = "已完成";
pub const OVERDUE_PREFIX: &str = "已逾期";
pub const REMAINING_PREFIX: &str = "剩余";

/// Distance between a due date and "now", split into display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Remaining {
    pub days: u64,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub is_overdue: bool,
}

impl Remaining {
    /// Whole seconds covered by the unit fields.
    pub fn total_seconds(&self) -> u64 {
        self.days * 86_400
            + u64::from(self.hours) * 3_600
            + u64::from(self.minutes) * 60
            + u64::from(self.seconds)
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_display(self, false))
    }
}

pub fn compute_remaining(due: DateTime<Utc>, now: DateTime<Utc>) -> Remaining {
    let diff_ms = (due - now).num_milliseconds();
    let abs_ms = diff_ms.unsigned_abs();

    // The modulo results always fit in u8.
    Remaining {
        days: abs_ms / MS_PER_DAY as u64,
        hours: ((abs_ms / MS_PER_HOUR as u64) % 24) as u8,
        minutes: ((abs_ms / MS_PER_MINUTE as u64) % 60) as u8,
        seconds: ((abs_ms / MS_PER_SECOND as u64) % 60) as u8,
        is_overdue: diff_ms < 0,
    }
}

/// Same as [`compute_remaining`] for a due date still in its stored string form.
pub fn compute_remaining_str(
    due: &str,
    now: DateTime<Utc>,
    zone: &LocalZone,
) -> CountdownResult<Remaining> {
    let due = parse_timestamp(due, zone)?;
    Ok(compute_remaining(due, now))
}

pub fn format_display(remaining: &Remaining, is_completed: bool) -> String {
    if is_completed {
        return COMPLETED_LABEL.to_string();
    }

    let prefix = if remaining.is_overdue {
        OVERDUE_PREFIX
    } else {
        REMAINING_PREFIX
    };

    if remaining.days > 0 {
        format!("{prefix} {}天 {}小时", remaining.days, remaining.hours)
    } else if remaining.hours > 0 {
        format!("{prefix} {}小时 {}分钟", remaining.hours, remaining.minutes)
    } else {
        format!("{prefix} {}分钟 {}秒", remaining.minutes, remaining.seconds)
    }
}

/// True when the due date falls within the next 24 hours, both ends exclusive.
pub fn is_upcoming(due: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let diff_ms = (due - now).num_milliseconds();
    diff_ms > 0 && diff_ms < MS_PER_DAY
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::error::CountdownError;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
            .single()
            .expect("valid base")
    }

    #[test]
    fn splits_future_distance_into_units() {
        let now = base();
        let due = now + Duration::days(3) + Duration::hours(4) + Duration::seconds(65);
        let r = compute_remaining(due, now);
        assert_eq!(
            r,
            Remaining {
                days: 3,
                hours: 4,
                minutes: 1,
                seconds: 5,
                is_overdue: false,
            }
        );
    }

    #[test]
    fn unit_fields_sum_to_whole_seconds() {
        let now = base();
        for offset_ms in [0_i64, 999, 1_000, 59_999, 3_600_000, 90_061_500, -45_296_789, -864_000_001] {
            let due = now + Duration::milliseconds(offset_ms);
            let r = compute_remaining(due, now);
            assert_eq!(r.total_seconds(), offset_ms.unsigned_abs() / 1000, "offset {offset_ms}");
            assert_eq!(r.is_overdue, due < now, "offset {offset_ms}");
        }
    }

    #[test]
    fn past_due_is_overdue() {
        let now = base();
        let r = compute_remaining(now - Duration::days(2) - Duration::hours(1), now);
        assert!(r.is_overdue);
        assert_eq!(format_display(&r, false), "已逾期 2天 1小时");
    }

    #[test]
    fn display_tiers() {
        let now = base();
        let days = compute_remaining(now + Duration::days(3) + Duration::hours(4), now);
        assert_eq!(format_display(&days, false), "剩余 3天 4小时");

        let hours = compute_remaining(now + Duration::hours(5) + Duration::minutes(7), now);
        assert_eq!(format_display(&hours, false), "剩余 5小时 7分钟");

        let minutes = compute_remaining(now + Duration::minutes(9) + Duration::seconds(2), now);
        assert_eq!(format_display(&minutes, false), "剩余 9分钟 2秒");

        let zero = compute_remaining(now, now);
        assert_eq!(format_display(&zero, false), "剩余 0分钟 0秒");
    }

    #[test]
    fn seconds_hidden_when_days_or_hours_present() {
        let r = Remaining {
            days: 0,
            hours: 1,
            minutes: 0,
            seconds: 42,
            is_overdue: false,
        };
        let text = format_display(&r, false);
        assert!(!text.contains('秒'));
        assert!(!text.contains('天'));
    }

    #[test]
    fn completed_ignores_duration() {
        let r = Remaining {
            days: 12,
            hours: 3,
            minutes: 0,
            seconds: 0,
            is_overdue: true,
        };
        assert_eq!(format_display(&r, true), COMPLETED_LABEL);
    }

    #[test]
    fn upcoming_window_is_exclusive() {
        let now = base();
        assert!(!is_upcoming(now, now));
        assert!(is_upcoming(now + Duration::milliseconds(1), now));
        assert!(is_upcoming(now + Duration::hours(23), now));
        assert!(!is_upcoming(now + Duration::hours(24), now));
        assert!(!is_upcoming(now - Duration::hours(1), now));
    }

    #[test]
    fn malformed_due_string_is_typed_error() {
        let err = compute_remaining_str("soon-ish", base(), &LocalZone::default())
            .expect_err("should not parse");
        assert!(matches!(err, CountdownError::InvalidDate(_)));
    }

    #[test]
    fn display_impl_matches_pending_format() {
        let now = base();
        let r = compute_remaining(now + Duration::minutes(3), now);
        assert_eq!(r.to_string(), "剩余 3分钟 0秒");
    }
}

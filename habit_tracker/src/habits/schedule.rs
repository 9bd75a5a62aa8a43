//! Deadline arithmetic in the habit owner's local wall clock.
//!
//! All functions are pure: callers pass the current instant, which keeps
//! the period math testable against fixed timestamps. A deadline is always
//! the instant 23:59:59 on the deadline date in the habit's local zone,
//! stored as UTC. Local time is derived from the stored whole-hour offset.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use super::models::Schedule;

/// Shift a UTC instant into the habit's local wall clock
pub fn to_local(utc: DateTime<Utc>, offset_hours: i32) -> DateTime<Utc> {
    utc + Duration::hours(offset_hours as i64)
}

/// The local calendar date for a UTC instant
pub fn local_date(utc: DateTime<Utc>, offset_hours: i32) -> NaiveDate {
    to_local(utc, offset_hours).date_naive()
}

/// The local calendar date as "YYYY-MM-DD"
pub fn local_date_string(utc: DateTime<Utc>, offset_hours: i32) -> String {
    local_date(utc, offset_hours).format("%Y-%m-%d").to_string()
}

/// Local weekday numbered `0 = Sunday .. 6 = Saturday`
fn local_weekday(utc: DateTime<Utc>, offset_hours: i32) -> i32 {
    to_local(utc, offset_hours).weekday().num_days_from_sunday() as i32
}

/// The UTC instant of 23:59:59 on `date` in the habit's local zone
pub fn end_of_day_utc(date: NaiveDate, offset_hours: i32) -> DateTime<Utc> {
    let local_end = date.and_hms_opt(23, 59, 59).expect("valid wall-clock time");
    DateTime::<Utc>::from_naive_utc_and_offset(local_end, Utc) - Duration::hours(offset_hours as i64)
}

/// Smallest date strictly after `from` whose weekday is in `days`,
/// wrapping within a 7-day window.
fn next_weekly_date(from: NaiveDate, days: &[i32]) -> NaiveDate {
    let current = from.weekday().num_days_from_sunday() as i32;
    for ahead in 1..=7 {
        let candidate = (current + ahead) % 7;
        if days.contains(&candidate) {
            return from + Duration::days(ahead as i64);
        }
    }
    from + Duration::days(7)
}

/// First deadline when a habit is created.
///
/// Interval habits owe a confirmation the same local day. Weekly habits
/// owe one today only if today's weekday is scheduled; otherwise the
/// first deadline is the next scheduled weekday.
pub fn initial_deadline(
    schedule: &Schedule,
    offset_hours: i32,
    from: DateTime<Utc>,
) -> DateTime<Utc> {
    let today = local_date(from, offset_hours);
    let deadline_date = match schedule {
        Schedule::Interval { .. } => today,
        Schedule::Weekly { days } => {
            if days.contains(&local_weekday(from, offset_hours)) {
                today
            } else {
                next_weekly_date(today, days)
            }
        }
    };
    end_of_day_utc(deadline_date, offset_hours)
}

/// Whether a freshly created habit owes nothing for the current period:
/// true only for weekly habits created on an unscheduled weekday.
pub fn initially_confirmed(schedule: &Schedule, offset_hours: i32, from: DateTime<Utc>) -> bool {
    match schedule {
        Schedule::Interval { .. } => false,
        Schedule::Weekly { days } => !days.contains(&local_weekday(from, offset_hours)),
    }
}

/// Deadline of the period after `from` (used on confirmation, on schedule
/// edits, and when re-arming a missed habit).
pub fn next_deadline(schedule: &Schedule, offset_hours: i32, from: DateTime<Utc>) -> DateTime<Utc> {
    let today = local_date(from, offset_hours);
    let deadline_date = match schedule {
        Schedule::Interval { days } => today + Duration::days(*days as i64),
        Schedule::Weekly { days } => next_weekly_date(today, days),
    };
    end_of_day_utc(deadline_date, offset_hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn interval_initial_deadline_is_end_of_local_today() {
        // Created 2025-01-10T09:00Z at offset +3: local 12:00, deadline
        // 23:59:59 local = 20:59:59Z.
        let schedule = Schedule::Interval { days: 1 };
        let deadline = initial_deadline(&schedule, 3, utc(2025, 1, 10, 9, 0));
        assert_eq!(
            deadline,
            Utc.with_ymd_and_hms(2025, 1, 10, 20, 59, 59).unwrap()
        );
    }

    #[test]
    fn interval_next_deadline_adds_local_days() {
        let schedule = Schedule::Interval { days: 1 };
        let next = next_deadline(&schedule, 3, utc(2025, 1, 10, 12, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 11, 20, 59, 59).unwrap());
    }

    #[test]
    fn interval_two_day_rearm_after_miss() {
        // Sweeper re-arms at 2025-02-02T00:10Z, offset 0, interval 2:
        // next deadline is Feb 4 end of day.
        let schedule = Schedule::Interval { days: 2 };
        let next = next_deadline(&schedule, 0, utc(2025, 2, 2, 0, 10));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 2, 4, 23, 59, 59).unwrap());
    }

    #[test]
    fn weekly_created_on_unscheduled_day() {
        // Mon/Wed/Fri habit created Tuesday 2025-03-04: first deadline is
        // Wednesday, and nothing is owed on Tuesday.
        let schedule = Schedule::Weekly { days: vec![1, 3, 5] };
        let created = utc(2025, 3, 4, 10, 0);

        let deadline = initial_deadline(&schedule, 0, created);
        assert_eq!(
            deadline,
            Utc.with_ymd_and_hms(2025, 3, 5, 23, 59, 59).unwrap()
        );
        assert!(initially_confirmed(&schedule, 0, created));
    }

    #[test]
    fn weekly_created_on_scheduled_day() {
        // 2025-03-05 is a Wednesday (weekday 3)
        let schedule = Schedule::Weekly { days: vec![1, 3, 5] };
        let created = utc(2025, 3, 5, 8, 0);

        let deadline = initial_deadline(&schedule, 0, created);
        assert_eq!(
            deadline,
            Utc.with_ymd_and_hms(2025, 3, 5, 23, 59, 59).unwrap()
        );
        assert!(!initially_confirmed(&schedule, 0, created));
    }

    #[test]
    fn weekly_next_deadline_skips_to_next_scheduled_day() {
        // Confirmed Wednesday 2025-03-05: next scheduled day is Friday.
        let schedule = Schedule::Weekly { days: vec![1, 3, 5] };
        let next = next_deadline(&schedule, 0, utc(2025, 3, 5, 14, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 7, 23, 59, 59).unwrap());
    }

    #[test]
    fn weekly_next_deadline_wraps_a_full_week() {
        // Only-Monday habit confirmed on Monday 2025-03-03 rolls to the
        // following Monday.
        let schedule = Schedule::Weekly { days: vec![1] };
        let next = next_deadline(&schedule, 0, utc(2025, 3, 3, 9, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 10, 23, 59, 59).unwrap());
    }

    #[test]
    fn negative_offset_shifts_deadline_forward_in_utc() {
        // Offset -5: local midnight lags UTC, so end of local day lands at
        // 04:59:59Z the next UTC day.
        let schedule = Schedule::Interval { days: 1 };
        let deadline = initial_deadline(&schedule, -5, utc(2025, 6, 1, 12, 0));
        assert_eq!(deadline, Utc.with_ymd_and_hms(2025, 6, 2, 4, 59, 59).unwrap());
    }

    #[test]
    fn local_date_rolls_over_with_offset() {
        // 23:00Z at +3 is already the next local day.
        assert_eq!(
            local_date_string(utc(2025, 1, 10, 23, 0), 3),
            "2025-01-11".to_string()
        );
        assert_eq!(
            local_date_string(utc(2025, 1, 10, 23, 0), 0),
            "2025-01-10".to_string()
        );
    }

    #[test]
    fn large_positive_offset_is_honored() {
        // Kiritimati-style +14: 2025-01-10T11:00Z is already Jan 11 local.
        assert_eq!(
            local_date_string(utc(2025, 1, 10, 11, 0), 14),
            "2025-01-11".to_string()
        );
    }
}

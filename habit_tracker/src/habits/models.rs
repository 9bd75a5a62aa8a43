//! Habit and confirmation data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::HabitError;

/// Timezone offsets are whole hours from UTC, bounded to real-world zones.
pub const MIN_TIMEZONE_OFFSET_HOURS: i32 = -12;
pub const MAX_TIMEZONE_OFFSET_HOURS: i32 = 14;

/// Habit schedule, tagged by recurrence shape.
///
/// Weekly days use `0 = Sunday .. 6 = Saturday`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schedule {
    /// Owed every `days` local days
    Interval { days: i32 },
    /// Owed on specific local weekdays
    Weekly { days: Vec<i32> },
}

impl Schedule {
    /// Validate the schedule shape: interval days must be positive, weekly
    /// day sets must be a non-empty subset of `0..=6`. Weekly days are
    /// sorted and deduplicated in place.
    pub fn validate(&mut self) -> Result<(), HabitError> {
        match self {
            Schedule::Interval { days } => {
                if *days < 1 {
                    return Err(HabitError::InvalidSchedule(
                        "interval days must be at least 1".to_string(),
                    ));
                }
            }
            Schedule::Weekly { days } => {
                if days.is_empty() {
                    return Err(HabitError::InvalidSchedule(
                        "weekly schedule requires at least one day".to_string(),
                    ));
                }
                if days.iter().any(|d| !(0..=6).contains(d)) {
                    return Err(HabitError::InvalidSchedule(
                        "weekly days must be between 0 (Sunday) and 6 (Saturday)".to_string(),
                    ));
                }
                days.sort_unstable();
                days.dedup();
            }
        }
        Ok(())
    }

    pub fn is_interval(&self) -> bool {
        matches!(self, Schedule::Interval { .. })
    }

    pub fn is_weekly(&self) -> bool {
        matches!(self, Schedule::Weekly { .. })
    }
}

/// A user's habit with its streak state.
///
/// `next_deadline_utc` is always set: the instant 23:59:59 on the deadline
/// date in the habit's local zone, stored as UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    pub id: Uuid,
    pub user_id: Uuid,

    pub name: String,
    pub description: Option<String>,
    /// HEX color, e.g. "#FF5722"
    pub color: Option<String>,

    pub schedule: Schedule,
    /// Snapshot of the owner's zone offset at create/update time
    pub timezone_offset_hours: i32,

    pub streak: i32,
    pub next_deadline_utc: DateTime<Utc>,
    pub confirmed_for_current_period: bool,
    pub last_confirmed_at: Option<DateTime<Utc>>,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a habit
#[derive(Debug, Clone, Deserialize)]
pub struct HabitCreate {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub schedule: Schedule,
    pub timezone_offset_hours: i32,
}

/// Mutable habit fields; `None` means "leave unchanged"
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HabitUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub schedule: Option<Schedule>,
    pub timezone_offset_hours: Option<i32>,
}

impl HabitUpdate {
    /// True when the change affects deadline computation
    pub fn touches_schedule(&self) -> bool {
        self.schedule.is_some() || self.timezone_offset_hours.is_some()
    }
}

/// A single confirmation of a habit. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub user_id: Uuid,

    pub confirmed_at: DateTime<Utc>,
    /// Calendar date in the habit's local zone, "YYYY-MM-DD"
    pub confirmed_for_date: String,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics over a habit's confirmation log
#[derive(Debug, Clone, Default, Serialize)]
pub struct HabitStats {
    pub total_confirmations: i64,
    pub first_confirmation: Option<DateTime<Utc>>,
    pub last_confirmation: Option<DateTime<Utc>>,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub completion_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_schedule_requires_positive_days() {
        let mut schedule = Schedule::Interval { days: 0 };
        assert!(schedule.validate().is_err());

        let mut schedule = Schedule::Interval { days: 1 };
        assert!(schedule.validate().is_ok());
    }

    #[test]
    fn weekly_schedule_rejects_empty_and_out_of_range() {
        let mut schedule = Schedule::Weekly { days: vec![] };
        assert!(schedule.validate().is_err());

        let mut schedule = Schedule::Weekly { days: vec![7] };
        assert!(schedule.validate().is_err());

        let mut schedule = Schedule::Weekly { days: vec![-1] };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn weekly_days_are_sorted_and_deduplicated() {
        let mut schedule = Schedule::Weekly {
            days: vec![5, 1, 3, 1],
        };
        schedule.validate().unwrap();
        assert_eq!(schedule, Schedule::Weekly { days: vec![1, 3, 5] });
    }

    #[test]
    fn schedule_serde_is_tagged() {
        let schedule = Schedule::Interval { days: 2 };
        let json = serde_json::to_string(&schedule).unwrap();
        assert!(json.contains("\"type\":\"interval\""));

        let parsed: Schedule = serde_json::from_str("{\"type\":\"weekly\",\"days\":[1,3]}").unwrap();
        assert_eq!(parsed, Schedule::Weekly { days: vec![1, 3] });
    }
}

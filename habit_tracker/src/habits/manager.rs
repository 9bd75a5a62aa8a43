//! Streak engine implementation.
//!
//! Owns habit CRUD, confirmation admission, and the two reconciliation
//! passes the sweeper drives. Deadline arithmetic lives in
//! [`super::schedule`]; this layer sequences it against the stores.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::db::{ConfirmationRepository, HabitRepository};

use super::errors::{HabitError, HabitResult};
use super::models::{
    Confirmation, Habit, HabitCreate, HabitStats, HabitUpdate, MAX_TIMEZONE_OFFSET_HOURS,
    MIN_TIMEZONE_OFFSET_HOURS,
};
use super::schedule;

const MAX_NAME_LENGTH: usize = 100;

/// Streak engine
#[derive(Clone)]
pub struct HabitManager {
    habits: Arc<dyn HabitRepository>,
    confirmations: Arc<dyn ConfirmationRepository>,
}

impl HabitManager {
    pub fn new(
        habits: Arc<dyn HabitRepository>,
        confirmations: Arc<dyn ConfirmationRepository>,
    ) -> Self {
        Self {
            habits,
            confirmations,
        }
    }

    /// Create a habit with its first deadline armed.
    ///
    /// Interval habits owe a confirmation today; weekly habits created on
    /// an unscheduled day start with nothing owed.
    pub async fn create_habit(&self, user_id: Uuid, mut create: HabitCreate) -> HabitResult<Habit> {
        validate_name(&create.name)?;
        create.schedule.validate()?;
        validate_offset(create.timezone_offset_hours)?;

        let now = Utc::now();
        let habit = Habit {
            id: Uuid::now_v7(),
            user_id,
            name: create.name,
            description: create.description,
            color: create.color,
            timezone_offset_hours: create.timezone_offset_hours,
            streak: 0,
            next_deadline_utc: schedule::initial_deadline(
                &create.schedule,
                create.timezone_offset_hours,
                now,
            ),
            confirmed_for_current_period: schedule::initially_confirmed(
                &create.schedule,
                create.timezone_offset_hours,
                now,
            ),
            schedule: create.schedule,
            last_confirmed_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.habits.create(&habit).await?;
        Ok(habit)
    }

    /// Fetch one habit scoped to its owner
    pub async fn get_habit(&self, habit_id: Uuid, user_id: Uuid) -> HabitResult<Habit> {
        self.habits
            .find_by_id_and_user(habit_id, user_id)
            .await?
            .ok_or(HabitError::NotFound)
    }

    /// List a user's habits, newest first
    pub async fn list_habits(&self, user_id: Uuid, active_only: bool) -> HabitResult<Vec<Habit>> {
        self.habits.find_by_user(user_id, active_only).await
    }

    /// Apply an update.
    ///
    /// Schedule or timezone changes re-arm the deadline from now and clear
    /// the confirmation flag; the streak is deliberately left intact so
    /// editing a schedule never penalizes the owner. Cosmetic edits leave
    /// deadline state untouched.
    pub async fn update_habit(
        &self,
        habit_id: Uuid,
        user_id: Uuid,
        update: HabitUpdate,
    ) -> HabitResult<Habit> {
        let mut habit = self.get_habit(habit_id, user_id).await?;

        let reschedule = update.touches_schedule();

        if let Some(name) = update.name {
            validate_name(&name)?;
            habit.name = name;
        }
        if let Some(description) = update.description {
            habit.description = Some(description);
        }
        if let Some(color) = update.color {
            habit.color = Some(color);
        }

        if let Some(mut new_schedule) = update.schedule {
            new_schedule.validate()?;
            habit.schedule = new_schedule;
        }
        if let Some(offset) = update.timezone_offset_hours {
            validate_offset(offset)?;
            habit.timezone_offset_hours = offset;
        }

        if reschedule {
            let now = Utc::now();
            habit.next_deadline_utc =
                schedule::next_deadline(&habit.schedule, habit.timezone_offset_hours, now);
            habit.confirmed_for_current_period = false;
        }

        habit.updated_at = Utc::now();
        self.habits.update(&habit).await?;
        Ok(habit)
    }

    /// Soft-delete a habit; it disappears from queries and sweeps
    pub async fn delete_habit(&self, habit_id: Uuid, user_id: Uuid) -> HabitResult<()> {
        self.get_habit(habit_id, user_id).await?;
        self.habits.soft_delete(habit_id).await
    }

    /// Admit one confirmation for the current period.
    ///
    /// The flag check is defense in depth; the data layer's uniqueness on
    /// `(habit_id, local_date)` is the authoritative guard, so two racing
    /// confirmations resolve to exactly one success.
    pub async fn confirm_habit(
        &self,
        habit_id: Uuid,
        user_id: Uuid,
        notes: Option<String>,
    ) -> HabitResult<(Habit, Confirmation)> {
        let mut habit = self.get_habit(habit_id, user_id).await?;

        if habit.confirmed_for_current_period {
            return Err(HabitError::AlreadyConfirmed);
        }

        let now = Utc::now();
        let local_date = schedule::local_date_string(now, habit.timezone_offset_hours);

        if self
            .confirmations
            .exists_for_date(habit_id, &local_date)
            .await?
        {
            return Err(HabitError::AlreadyConfirmed);
        }

        let confirmation = Confirmation {
            id: Uuid::now_v7(),
            habit_id,
            user_id,
            confirmed_at: now,
            confirmed_for_date: local_date,
            notes,
            created_at: now,
        };
        self.confirmations.create(&confirmation).await?;

        habit.streak += 1;
        habit.confirmed_for_current_period = true;
        habit.last_confirmed_at = Some(now);
        habit.next_deadline_utc =
            schedule::next_deadline(&habit.schedule, habit.timezone_offset_hours, now);

        self.habits
            .update_streak_and_deadline(
                habit_id,
                habit.streak,
                habit.next_deadline_utc,
                true,
                Some(now),
            )
            .await?;

        Ok((habit, confirmation))
    }

    /// Page through a habit's confirmation log, newest first
    pub async fn history(
        &self,
        habit_id: Uuid,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> HabitResult<(Vec<Confirmation>, i64)> {
        self.get_habit(habit_id, user_id).await?;
        let confirmations = self
            .confirmations
            .find_by_habit(habit_id, limit, offset)
            .await?;
        let total = self.confirmations.count_by_habit(habit_id).await?;
        Ok((confirmations, total))
    }

    /// Aggregate statistics over a habit's confirmation log
    pub async fn stats(&self, habit_id: Uuid, user_id: Uuid) -> HabitResult<HabitStats> {
        self.get_habit(habit_id, user_id).await?;
        self.confirmations.stats(habit_id).await
    }

    /// Sweeper pass A: clear confirmation flags when a new period begins.
    ///
    /// Candidates are confirmed habits whose deadline falls within ±24h of
    /// now; the window covers every valid offset. The flag clears only
    /// when local "today" has reached the deadline date. Re-running is a
    /// no-op. Returns how many flags were cleared.
    pub async fn reset_confirmation_flags(
        &self,
        now: chrono::DateTime<Utc>,
    ) -> HabitResult<usize> {
        let window = Duration::hours(24);
        let habits = self
            .habits
            .find_confirmed_in_window(now - window, now + window)
            .await?;

        let mut cleared = 0;
        for habit in habits {
            let today = schedule::local_date(now, habit.timezone_offset_hours);
            let deadline_date =
                schedule::local_date(habit.next_deadline_utc, habit.timezone_offset_hours);

            if today == deadline_date {
                if let Err(e) = self.habits.reset_confirmation_flag(habit.id).await {
                    tracing::warn!(habit_id = %habit.id, error = %e, "confirmation flag reset failed");
                    continue;
                }
                tracing::debug!(habit_id = %habit.id, user_id = %habit.user_id, "new period started, flag cleared");
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    /// Sweeper pass B: demote habits whose deadline passed unconfirmed.
    ///
    /// Streak drops to zero and a new period is armed from now, with the
    /// flag left false. Re-running within the same minute recomputes the
    /// same deadline, so repetition is harmless. Returns how many habits
    /// were demoted.
    pub async fn process_missed_deadlines(
        &self,
        now: chrono::DateTime<Utc>,
    ) -> HabitResult<usize> {
        let habits = self.habits.find_missed_deadlines(now).await?;

        let mut demoted = 0;
        for habit in habits {
            let next =
                schedule::next_deadline(&habit.schedule, habit.timezone_offset_hours, now);

            if let Err(e) = self
                .habits
                .update_streak_and_deadline(habit.id, 0, next, false, None)
                .await
            {
                tracing::warn!(habit_id = %habit.id, error = %e, "streak demotion failed");
                continue;
            }
            tracing::info!(
                habit_id = %habit.id,
                user_id = %habit.user_id,
                lost_streak = habit.streak,
                "missed deadline, streak reset"
            );
            demoted += 1;
        }
        Ok(demoted)
    }
}

fn validate_name(name: &str) -> HabitResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(HabitError::InvalidName("name is required".to_string()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(HabitError::InvalidName(format!(
            "name is too long (max {MAX_NAME_LENGTH} characters)"
        )));
    }
    Ok(())
}

fn validate_offset(offset: i32) -> HabitResult<()> {
    if !(MIN_TIMEZONE_OFFSET_HOURS..=MAX_TIMEZONE_OFFSET_HOURS).contains(&offset) {
        return Err(HabitError::InvalidTimezoneOffset(offset));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryConfirmationRepository, MemoryHabitRepository};
    use crate::habits::Schedule;

    fn manager() -> HabitManager {
        HabitManager::new(
            Arc::new(MemoryHabitRepository::new()),
            Arc::new(MemoryConfirmationRepository::new()),
        )
    }

    fn daily_create() -> HabitCreate {
        HabitCreate {
            name: "Morning run".to_string(),
            description: Some("5k before work".to_string()),
            color: Some("#FF5722".to_string()),
            schedule: Schedule::Interval { days: 1 },
            timezone_offset_hours: 0,
        }
    }

    #[tokio::test]
    async fn create_arms_first_deadline_today() {
        let manager = manager();
        let user_id = Uuid::now_v7();

        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();
        assert_eq!(habit.streak, 0);
        assert!(!habit.confirmed_for_current_period);
        assert!(habit.next_deadline_utc > Utc::now() - Duration::days(1));

        let today = schedule::local_date(Utc::now(), 0);
        assert_eq!(schedule::local_date(habit.next_deadline_utc, 0), today);
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let manager = manager();
        let user_id = Uuid::now_v7();

        let mut bad = daily_create();
        bad.name = "  ".to_string();
        assert!(matches!(
            manager.create_habit(user_id, bad).await,
            Err(HabitError::InvalidName(_))
        ));

        let mut bad = daily_create();
        bad.schedule = Schedule::Interval { days: 0 };
        assert!(matches!(
            manager.create_habit(user_id, bad).await,
            Err(HabitError::InvalidSchedule(_))
        ));

        let mut bad = daily_create();
        bad.timezone_offset_hours = 15;
        assert!(matches!(
            manager.create_habit(user_id, bad).await,
            Err(HabitError::InvalidTimezoneOffset(15))
        ));
    }

    #[tokio::test]
    async fn confirm_increments_streak_and_rolls_deadline() {
        let manager = manager();
        let user_id = Uuid::now_v7();
        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();

        let (updated, confirmation) = manager
            .confirm_habit(habit.id, user_id, Some("done".to_string()))
            .await
            .unwrap();

        assert_eq!(updated.streak, 1);
        assert!(updated.confirmed_for_current_period);
        assert!(updated.last_confirmed_at.is_some());
        assert!(updated.next_deadline_utc > habit.next_deadline_utc);
        assert_eq!(confirmation.habit_id, habit.id);
        assert_eq!(
            confirmation.confirmed_for_date,
            schedule::local_date_string(Utc::now(), 0)
        );
    }

    #[tokio::test]
    async fn second_confirm_same_period_is_rejected() {
        let manager = manager();
        let user_id = Uuid::now_v7();
        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();

        manager.confirm_habit(habit.id, user_id, None).await.unwrap();
        assert!(matches!(
            manager.confirm_habit(habit.id, user_id, None).await,
            Err(HabitError::AlreadyConfirmed)
        ));
    }

    #[tokio::test]
    async fn concurrent_confirms_admit_exactly_one() {
        let manager = manager();
        let user_id = Uuid::now_v7();
        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();

        let m1 = manager.clone();
        let m2 = manager.clone();
        let (r1, r2) = tokio::join!(
            m1.confirm_habit(habit.id, user_id, None),
            m2.confirm_habit(habit.id, user_id, None),
        );

        let successes = [r1.is_ok(), r2.is_ok()].iter().filter(|b| **b).count();
        assert_eq!(successes, 1);

        let (confirmations, total) = manager.history(habit.id, user_id, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(confirmations.len(), 1);
    }

    #[tokio::test]
    async fn confirm_unknown_or_foreign_habit_is_not_found() {
        let manager = manager();
        let user_id = Uuid::now_v7();
        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();

        assert!(matches!(
            manager.confirm_habit(Uuid::now_v7(), user_id, None).await,
            Err(HabitError::NotFound)
        ));
        assert!(matches!(
            manager.confirm_habit(habit.id, Uuid::now_v7(), None).await,
            Err(HabitError::NotFound)
        ));
    }

    #[tokio::test]
    async fn cosmetic_update_keeps_deadline_state() {
        let manager = manager();
        let user_id = Uuid::now_v7();
        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();
        manager.confirm_habit(habit.id, user_id, None).await.unwrap();

        let updated = manager
            .update_habit(
                habit.id,
                user_id,
                HabitUpdate {
                    name: Some("Evening run".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Evening run");
        assert_eq!(updated.streak, 1);
        assert!(updated.confirmed_for_current_period);
    }

    #[tokio::test]
    async fn schedule_update_rearms_deadline_but_keeps_streak() {
        let manager = manager();
        let user_id = Uuid::now_v7();
        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();
        manager.confirm_habit(habit.id, user_id, None).await.unwrap();

        let updated = manager
            .update_habit(
                habit.id,
                user_id,
                HabitUpdate {
                    schedule: Some(Schedule::Interval { days: 3 }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.streak, 1);
        assert!(!updated.confirmed_for_current_period);
        assert_eq!(updated.schedule, Schedule::Interval { days: 3 });
    }

    #[tokio::test]
    async fn deleted_habit_vanishes_from_queries() {
        let manager = manager();
        let user_id = Uuid::now_v7();
        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();

        manager.delete_habit(habit.id, user_id).await.unwrap();

        assert!(matches!(
            manager.get_habit(habit.id, user_id).await,
            Err(HabitError::NotFound)
        ));
        assert!(manager.list_habits(user_id, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missed_deadline_demotes_to_zero_and_rearms() {
        let manager = manager();
        let user_id = Uuid::now_v7();
        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();
        manager.confirm_habit(habit.id, user_id, None).await.unwrap();

        // The sweeper ticks every minute: pass A clears the flag during
        // the deadline's local day, pass B demotes once it has elapsed.
        let deadline = manager
            .get_habit(habit.id, user_id)
            .await
            .unwrap()
            .next_deadline_utc;

        let on_deadline_day = deadline - Duration::hours(2);
        manager
            .reset_confirmation_flags(on_deadline_day)
            .await
            .unwrap();

        let after_deadline = deadline + Duration::minutes(10);
        manager.reset_confirmation_flags(after_deadline).await.unwrap();
        let demoted = manager.process_missed_deadlines(after_deadline).await.unwrap();
        assert_eq!(demoted, 1);

        let habit = manager.get_habit(habit.id, user_id).await.unwrap();
        assert_eq!(habit.streak, 0);
        assert!(!habit.confirmed_for_current_period);
        assert!(habit.next_deadline_utc > after_deadline);
    }

    #[tokio::test]
    async fn sweeper_passes_are_idempotent() {
        let manager = manager();
        let user_id = Uuid::now_v7();
        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();

        let after_deadline = habit.next_deadline_utc + Duration::minutes(10);

        manager.reset_confirmation_flags(after_deadline).await.unwrap();
        manager.process_missed_deadlines(after_deadline).await.unwrap();
        let state_once = manager.get_habit(habit.id, user_id).await.unwrap();

        manager.reset_confirmation_flags(after_deadline).await.unwrap();
        let demoted_again = manager.process_missed_deadlines(after_deadline).await.unwrap();
        let state_twice = manager.get_habit(habit.id, user_id).await.unwrap();

        assert_eq!(demoted_again, 0);
        assert_eq!(state_once.streak, state_twice.streak);
        assert_eq!(state_once.next_deadline_utc, state_twice.next_deadline_utc);
        assert_eq!(
            state_once.confirmed_for_current_period,
            state_twice.confirmed_for_current_period
        );
    }

    #[tokio::test]
    async fn pass_a_clears_flag_only_on_deadline_day() {
        let manager = manager();
        let user_id = Uuid::now_v7();

        // Weekly habit created on an unscheduled day starts confirmed
        // with its deadline on the next scheduled weekday.
        let habit = manager
            .create_habit(
                user_id,
                HabitCreate {
                    name: "Gym".to_string(),
                    description: None,
                    color: None,
                    schedule: Schedule::Weekly {
                        days: vec![0, 1, 2, 3, 4, 5, 6],
                    },
                    timezone_offset_hours: 0,
                },
            )
            .await
            .unwrap();
        // Every day is scheduled, so today is owed; confirm it.
        manager.confirm_habit(habit.id, user_id, None).await.unwrap();
        let deadline = manager
            .get_habit(habit.id, user_id)
            .await
            .unwrap()
            .next_deadline_utc;

        // Well before the deadline's local day: nothing clears
        let early = deadline - Duration::hours(30);
        let cleared = manager.reset_confirmation_flags(early).await.unwrap();
        assert_eq!(cleared, 0);

        // On the deadline's local day: flag clears, habit owed again
        let on_day = deadline - Duration::hours(2);
        let cleared = manager.reset_confirmation_flags(on_day).await.unwrap();
        assert_eq!(cleared, 1);
        let habit = manager.get_habit(habit.id, user_id).await.unwrap();
        assert!(!habit.confirmed_for_current_period);
    }

    #[tokio::test]
    async fn stats_track_confirmation_log() {
        let manager = manager();
        let user_id = Uuid::now_v7();
        let habit = manager.create_habit(user_id, daily_create()).await.unwrap();
        manager.confirm_habit(habit.id, user_id, None).await.unwrap();

        let stats = manager.stats(habit.id, user_id).await.unwrap();
        assert_eq!(stats.total_confirmations, 1);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 1);
        assert!(stats.first_confirmation.is_some());
    }
}

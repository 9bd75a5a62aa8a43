//! Habit and confirmation repositories.
//!
//! The `(habit_id, confirmed_for_date)` uniqueness constraint lives here
//! and is the authoritative guard against double confirmation; the manager
//! layer's flag check is defense in depth.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::habits::{Confirmation, Habit, HabitError, HabitResult, HabitStats, Schedule};

/// Trait for habit repository operations
#[async_trait]
pub trait HabitRepository: Send + Sync {
    /// Persist a new habit
    async fn create(&self, habit: &Habit) -> HabitResult<()>;

    /// Find an active habit by id scoped to its owner
    async fn find_by_id_and_user(&self, habit_id: Uuid, user_id: Uuid)
        -> HabitResult<Option<Habit>>;

    /// List a user's habits, newest first
    async fn find_by_user(&self, user_id: Uuid, active_only: bool) -> HabitResult<Vec<Habit>>;

    /// Update basic fields, schedule, and deadline state
    async fn update(&self, habit: &Habit) -> HabitResult<()>;

    /// Soft-delete: set `is_active = false`
    async fn soft_delete(&self, habit_id: Uuid) -> HabitResult<()>;

    /// Persist streak, deadline, flag, and (when confirming) the
    /// confirmation timestamp in one update
    async fn update_streak_and_deadline(
        &self,
        habit_id: Uuid,
        streak: i32,
        next_deadline_utc: DateTime<Utc>,
        confirmed: bool,
        last_confirmed_at: Option<DateTime<Utc>>,
    ) -> HabitResult<()>;

    /// Clear `confirmed_for_current_period`
    async fn reset_confirmation_flag(&self, habit_id: Uuid) -> HabitResult<()>;

    /// Active, unconfirmed habits whose deadline has elapsed (sweeper pass B)
    async fn find_missed_deadlines(&self, now: DateTime<Utc>) -> HabitResult<Vec<Habit>>;

    /// Active, confirmed habits with a deadline inside the window
    /// (sweeper pass A candidates)
    async fn find_confirmed_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> HabitResult<Vec<Habit>>;
}

/// Trait for confirmation repository operations
#[async_trait]
pub trait ConfirmationRepository: Send + Sync {
    /// Append a confirmation. Fails with `AlreadyConfirmed` when one
    /// already exists for `(habit_id, confirmed_for_date)`.
    async fn create(&self, confirmation: &Confirmation) -> HabitResult<()>;

    /// Whether a confirmation exists for the habit on the local date
    async fn exists_for_date(&self, habit_id: Uuid, date: &str) -> HabitResult<bool>;

    /// Page through a habit's confirmations, newest first
    async fn find_by_habit(
        &self,
        habit_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> HabitResult<Vec<Confirmation>>;

    /// Total confirmations for a habit
    async fn count_by_habit(&self, habit_id: Uuid) -> HabitResult<i64>;

    /// Aggregate statistics over the confirmation log
    async fn stats(&self, habit_id: Uuid) -> HabitResult<HabitStats>;
}

const HABIT_COLUMNS: &str = "id, user_id, name, description, color, schedule_type, interval_days, \
     weekly_days, timezone_offset_hours, streak, next_deadline_utc, \
     confirmed_for_current_period, last_confirmed_at, is_active, created_at, updated_at";

fn row_to_habit(row: sqlx::postgres::PgRow) -> Habit {
    let schedule_type: String = row.get("schedule_type");
    let schedule = if schedule_type == "weekly" {
        Schedule::Weekly {
            days: row
                .get::<Option<Vec<i32>>, _>("weekly_days")
                .unwrap_or_default(),
        }
    } else {
        Schedule::Interval {
            days: row.get::<Option<i32>, _>("interval_days").unwrap_or(1),
        }
    };

    Habit {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        description: row.get("description"),
        color: row.get("color"),
        schedule,
        timezone_offset_hours: row.get("timezone_offset_hours"),
        streak: row.get("streak"),
        next_deadline_utc: row.get("next_deadline_utc"),
        confirmed_for_current_period: row.get("confirmed_for_current_period"),
        last_confirmed_at: row.get("last_confirmed_at"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn schedule_columns(schedule: &Schedule) -> (&'static str, Option<i32>, Option<Vec<i32>>) {
    match schedule {
        Schedule::Interval { days } => ("interval", Some(*days), None),
        Schedule::Weekly { days } => ("weekly", None, Some(days.clone())),
    }
}

/// PostgreSQL implementation of [`HabitRepository`]
pub struct PgHabitRepository {
    pool: PgPool,
}

impl PgHabitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HabitRepository for PgHabitRepository {
    async fn create(&self, habit: &Habit) -> HabitResult<()> {
        let (schedule_type, interval_days, weekly_days) = schedule_columns(&habit.schedule);
        sqlx::query(
            "INSERT INTO habits (id, user_id, name, description, color,
                                 schedule_type, interval_days, weekly_days, timezone_offset_hours,
                                 streak, next_deadline_utc, confirmed_for_current_period,
                                 last_confirmed_at, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(habit.id)
        .bind(habit.user_id)
        .bind(&habit.name)
        .bind(&habit.description)
        .bind(&habit.color)
        .bind(schedule_type)
        .bind(interval_days)
        .bind(weekly_days)
        .bind(habit.timezone_offset_hours)
        .bind(habit.streak)
        .bind(habit.next_deadline_utc)
        .bind(habit.confirmed_for_current_period)
        .bind(habit.last_confirmed_at)
        .bind(habit.is_active)
        .bind(habit.created_at)
        .bind(habit.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id_and_user(
        &self,
        habit_id: Uuid,
        user_id: Uuid,
    ) -> HabitResult<Option<Habit>> {
        let row = sqlx::query(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits
             WHERE id = $1 AND user_id = $2 AND is_active = TRUE"
        ))
        .bind(habit_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_habit))
    }

    async fn find_by_user(&self, user_id: Uuid, active_only: bool) -> HabitResult<Vec<Habit>> {
        let mut query = format!("SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = $1");
        if active_only {
            query.push_str(" AND is_active = TRUE");
        }
        query.push_str(" ORDER BY created_at DESC");

        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(row_to_habit).collect())
    }

    async fn update(&self, habit: &Habit) -> HabitResult<()> {
        let (schedule_type, interval_days, weekly_days) = schedule_columns(&habit.schedule);
        let result = sqlx::query(
            "UPDATE habits SET
                name = $1, description = $2, color = $3,
                schedule_type = $4, interval_days = $5, weekly_days = $6,
                timezone_offset_hours = $7, streak = $8, next_deadline_utc = $9,
                confirmed_for_current_period = $10, last_confirmed_at = $11,
                updated_at = NOW()
             WHERE id = $12 AND is_active = TRUE",
        )
        .bind(&habit.name)
        .bind(&habit.description)
        .bind(&habit.color)
        .bind(schedule_type)
        .bind(interval_days)
        .bind(weekly_days)
        .bind(habit.timezone_offset_hours)
        .bind(habit.streak)
        .bind(habit.next_deadline_utc)
        .bind(habit.confirmed_for_current_period)
        .bind(habit.last_confirmed_at)
        .bind(habit.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HabitError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete(&self, habit_id: Uuid) -> HabitResult<()> {
        let result = sqlx::query(
            "UPDATE habits SET is_active = FALSE, updated_at = NOW()
             WHERE id = $1 AND is_active = TRUE",
        )
        .bind(habit_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HabitError::NotFound);
        }
        Ok(())
    }

    async fn update_streak_and_deadline(
        &self,
        habit_id: Uuid,
        streak: i32,
        next_deadline_utc: DateTime<Utc>,
        confirmed: bool,
        last_confirmed_at: Option<DateTime<Utc>>,
    ) -> HabitResult<()> {
        let result = sqlx::query(
            "UPDATE habits SET
                streak = $1, next_deadline_utc = $2, confirmed_for_current_period = $3,
                last_confirmed_at = COALESCE($4, last_confirmed_at), updated_at = NOW()
             WHERE id = $5",
        )
        .bind(streak)
        .bind(next_deadline_utc)
        .bind(confirmed)
        .bind(last_confirmed_at)
        .bind(habit_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HabitError::NotFound);
        }
        Ok(())
    }

    async fn reset_confirmation_flag(&self, habit_id: Uuid) -> HabitResult<()> {
        sqlx::query(
            "UPDATE habits SET confirmed_for_current_period = FALSE, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(habit_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_missed_deadlines(&self, now: DateTime<Utc>) -> HabitResult<Vec<Habit>> {
        let rows = sqlx::query(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits
             WHERE is_active = TRUE
               AND confirmed_for_current_period = FALSE
               AND next_deadline_utc <= $1
             ORDER BY next_deadline_utc ASC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_habit).collect())
    }

    async fn find_confirmed_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> HabitResult<Vec<Habit>> {
        let rows = sqlx::query(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits
             WHERE is_active = TRUE
               AND confirmed_for_current_period = TRUE
               AND next_deadline_utc >= $1
               AND next_deadline_utc <= $2
             ORDER BY next_deadline_utc ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_habit).collect())
    }
}

/// PostgreSQL implementation of [`ConfirmationRepository`]
pub struct PgConfirmationRepository {
    pool: PgPool,
}

impl PgConfirmationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_confirmation(row: sqlx::postgres::PgRow) -> Confirmation {
    Confirmation {
        id: row.get("id"),
        habit_id: row.get("habit_id"),
        user_id: row.get("user_id"),
        confirmed_at: row.get("confirmed_at"),
        confirmed_for_date: row.get("confirmed_for_date"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ConfirmationRepository for PgConfirmationRepository {
    async fn create(&self, confirmation: &Confirmation) -> HabitResult<()> {
        let result = sqlx::query(
            "INSERT INTO habit_confirmations
                (id, habit_id, user_id, confirmed_at, confirmed_for_date, notes, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(confirmation.id)
        .bind(confirmation.habit_id)
        .bind(confirmation.user_id)
        .bind(confirmation.confirmed_at)
        .bind(&confirmation.confirmed_for_date)
        .bind(&confirmation.notes)
        .bind(confirmation.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(HabitError::AlreadyConfirmed)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists_for_date(&self, habit_id: Uuid, date: &str) -> HabitResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(
                SELECT 1 FROM habit_confirmations
                WHERE habit_id = $1 AND confirmed_for_date = $2
            )",
        )
        .bind(habit_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<bool, _>(0))
    }

    async fn find_by_habit(
        &self,
        habit_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> HabitResult<Vec<Confirmation>> {
        let limit = if limit <= 0 { 30 } else { limit };
        let rows = sqlx::query(
            "SELECT id, habit_id, user_id, confirmed_at, confirmed_for_date, notes, created_at
             FROM habit_confirmations
             WHERE habit_id = $1
             ORDER BY confirmed_for_date DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(habit_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_confirmation).collect())
    }

    async fn count_by_habit(&self, habit_id: Uuid) -> HabitResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM habit_confirmations WHERE habit_id = $1")
            .bind(habit_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i64, _>(0))
    }

    async fn stats(&self, habit_id: Uuid) -> HabitResult<HabitStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    MIN(confirmed_at) AS first_confirmation,
                    MAX(confirmed_at) AS last_confirmation
             FROM habit_confirmations
             WHERE habit_id = $1",
        )
        .bind(habit_id)
        .fetch_one(&self.pool)
        .await?;

        let mut stats = HabitStats {
            total_confirmations: row.get("total"),
            first_confirmation: row.get("first_confirmation"),
            last_confirmation: row.get("last_confirmation"),
            ..Default::default()
        };

        // Group consecutive local dates; the run containing the newest
        // confirmation is the current streak.
        let streak_row = sqlx::query(
            "WITH confirmation_dates AS (
                SELECT confirmed_for_date::date AS d,
                       confirmed_for_date::date
                           - (ROW_NUMBER() OVER (ORDER BY confirmed_for_date))::int AS grp
                FROM habit_confirmations
                WHERE habit_id = $1
            ),
            runs AS (
                SELECT COUNT(*) AS run_length, MAX(d) AS last_date
                FROM confirmation_dates
                GROUP BY grp
            )
            SELECT COALESCE(MAX(run_length), 0) AS longest,
                   COALESCE((SELECT run_length FROM runs
                             WHERE last_date = (SELECT MAX(d) FROM confirmation_dates)), 0)
                       AS current
            FROM runs",
        )
        .bind(habit_id)
        .fetch_one(&self.pool)
        .await?;

        stats.longest_streak = streak_row.get("longest");
        stats.current_streak = streak_row.get("current");

        if let (Some(first), Some(_)) = (stats.first_confirmation, stats.last_confirmation) {
            let days_since_start = (Utc::now() - first).num_days();
            if days_since_start > 0 {
                stats.completion_rate =
                    (stats.total_confirmations as f64 / days_since_start as f64 * 100.0).min(100.0);
            }
        }

        Ok(stats)
    }
}

/// In-memory habit repository for development wiring and tests
#[derive(Default)]
pub struct MemoryHabitRepository {
    habits: std::sync::Mutex<std::collections::HashMap<Uuid, Habit>>,
}

impl MemoryHabitRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HabitRepository for MemoryHabitRepository {
    async fn create(&self, habit: &Habit) -> HabitResult<()> {
        self.habits
            .lock()
            .expect("habit map poisoned")
            .insert(habit.id, habit.clone());
        Ok(())
    }

    async fn find_by_id_and_user(
        &self,
        habit_id: Uuid,
        user_id: Uuid,
    ) -> HabitResult<Option<Habit>> {
        let habits = self.habits.lock().expect("habit map poisoned");
        Ok(habits
            .get(&habit_id)
            .filter(|h| h.user_id == user_id && h.is_active)
            .cloned())
    }

    async fn find_by_user(&self, user_id: Uuid, active_only: bool) -> HabitResult<Vec<Habit>> {
        let habits = self.habits.lock().expect("habit map poisoned");
        let mut result: Vec<Habit> = habits
            .values()
            .filter(|h| h.user_id == user_id && (!active_only || h.is_active))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn update(&self, habit: &Habit) -> HabitResult<()> {
        let mut habits = self.habits.lock().expect("habit map poisoned");
        let existing = habits
            .get_mut(&habit.id)
            .filter(|h| h.is_active)
            .ok_or(HabitError::NotFound)?;
        *existing = habit.clone();
        existing.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete(&self, habit_id: Uuid) -> HabitResult<()> {
        let mut habits = self.habits.lock().expect("habit map poisoned");
        let habit = habits
            .get_mut(&habit_id)
            .filter(|h| h.is_active)
            .ok_or(HabitError::NotFound)?;
        habit.is_active = false;
        habit.updated_at = Utc::now();
        Ok(())
    }

    async fn update_streak_and_deadline(
        &self,
        habit_id: Uuid,
        streak: i32,
        next_deadline_utc: DateTime<Utc>,
        confirmed: bool,
        last_confirmed_at: Option<DateTime<Utc>>,
    ) -> HabitResult<()> {
        let mut habits = self.habits.lock().expect("habit map poisoned");
        let habit = habits.get_mut(&habit_id).ok_or(HabitError::NotFound)?;
        habit.streak = streak;
        habit.next_deadline_utc = next_deadline_utc;
        habit.confirmed_for_current_period = confirmed;
        if last_confirmed_at.is_some() {
            habit.last_confirmed_at = last_confirmed_at;
        }
        habit.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_confirmation_flag(&self, habit_id: Uuid) -> HabitResult<()> {
        let mut habits = self.habits.lock().expect("habit map poisoned");
        if let Some(habit) = habits.get_mut(&habit_id) {
            habit.confirmed_for_current_period = false;
            habit.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_missed_deadlines(&self, now: DateTime<Utc>) -> HabitResult<Vec<Habit>> {
        let habits = self.habits.lock().expect("habit map poisoned");
        let mut result: Vec<Habit> = habits
            .values()
            .filter(|h| h.is_active && !h.confirmed_for_current_period && h.next_deadline_utc <= now)
            .cloned()
            .collect();
        result.sort_by_key(|h| h.next_deadline_utc);
        Ok(result)
    }

    async fn find_confirmed_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> HabitResult<Vec<Habit>> {
        let habits = self.habits.lock().expect("habit map poisoned");
        let mut result: Vec<Habit> = habits
            .values()
            .filter(|h| {
                h.is_active
                    && h.confirmed_for_current_period
                    && h.next_deadline_utc >= from
                    && h.next_deadline_utc <= to
            })
            .cloned()
            .collect();
        result.sort_by_key(|h| h.next_deadline_utc);
        Ok(result)
    }
}

/// In-memory confirmation repository. Insertion is atomic under one lock,
/// which preserves the one-per-local-day guarantee under concurrency.
#[derive(Default)]
pub struct MemoryConfirmationRepository {
    confirmations: std::sync::Mutex<Vec<Confirmation>>,
}

impl MemoryConfirmationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfirmationRepository for MemoryConfirmationRepository {
    async fn create(&self, confirmation: &Confirmation) -> HabitResult<()> {
        let mut confirmations = self.confirmations.lock().expect("confirmation log poisoned");
        if confirmations.iter().any(|c| {
            c.habit_id == confirmation.habit_id
                && c.confirmed_for_date == confirmation.confirmed_for_date
        }) {
            return Err(HabitError::AlreadyConfirmed);
        }
        confirmations.push(confirmation.clone());
        Ok(())
    }

    async fn exists_for_date(&self, habit_id: Uuid, date: &str) -> HabitResult<bool> {
        let confirmations = self.confirmations.lock().expect("confirmation log poisoned");
        Ok(confirmations
            .iter()
            .any(|c| c.habit_id == habit_id && c.confirmed_for_date == date))
    }

    async fn find_by_habit(
        &self,
        habit_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> HabitResult<Vec<Confirmation>> {
        let limit = if limit <= 0 { 30 } else { limit };
        let confirmations = self.confirmations.lock().expect("confirmation log poisoned");
        let mut matching: Vec<Confirmation> = confirmations
            .iter()
            .filter(|c| c.habit_id == habit_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.confirmed_for_date.cmp(&a.confirmed_for_date));
        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_by_habit(&self, habit_id: Uuid) -> HabitResult<i64> {
        let confirmations = self.confirmations.lock().expect("confirmation log poisoned");
        Ok(confirmations
            .iter()
            .filter(|c| c.habit_id == habit_id)
            .count() as i64)
    }

    async fn stats(&self, habit_id: Uuid) -> HabitResult<HabitStats> {
        use chrono::NaiveDate;

        let confirmations = self.confirmations.lock().expect("confirmation log poisoned");
        let matching: Vec<&Confirmation> = confirmations
            .iter()
            .filter(|c| c.habit_id == habit_id)
            .collect();

        let mut stats = HabitStats {
            total_confirmations: matching.len() as i64,
            first_confirmation: matching.iter().map(|c| c.confirmed_at).min(),
            last_confirmation: matching.iter().map(|c| c.confirmed_at).max(),
            ..Default::default()
        };

        let mut dates: Vec<NaiveDate> = matching
            .iter()
            .filter_map(|c| NaiveDate::parse_from_str(&c.confirmed_for_date, "%Y-%m-%d").ok())
            .collect();
        dates.sort_unstable();
        dates.dedup();

        let mut longest: i64 = 0;
        let mut current_run: i64 = 0;
        let mut previous: Option<NaiveDate> = None;
        for date in &dates {
            current_run = match previous {
                Some(p) if *date == p + chrono::Duration::days(1) => current_run + 1,
                _ => 1,
            };
            longest = longest.max(current_run);
            previous = Some(*date);
        }
        stats.longest_streak = longest;
        stats.current_streak = current_run;

        if let Some(first) = stats.first_confirmation {
            let days_since_start = (Utc::now() - first).num_days();
            if days_since_start > 0 {
                stats.completion_rate =
                    (stats.total_confirmations as f64 / days_since_start as f64 * 100.0).min(100.0);
            }
        }

        Ok(stats)
    }
}

//! Streak engine: habit schedules, per-period confirmations, and the
//! background sweeper.
//!
//! A habit owes exactly one confirmation per period. Deadlines are
//! computed in the owner's local wall clock (whole-hour offset snapshot)
//! and stored as UTC instants of 23:59:59 on the deadline date. Missed
//! deadlines demote the streak to zero and arm a new period; the sweeper
//! drives that reconciliation independently of any request.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use habit_tracker::db::{MemoryConfirmationRepository, MemoryHabitRepository};
//! use habit_tracker::habits::{HabitCreate, HabitManager, Schedule};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let habits = HabitManager::new(
//!         Arc::new(MemoryHabitRepository::new()),
//!         Arc::new(MemoryConfirmationRepository::new()),
//!     );
//!
//!     let habit = habits
//!         .create_habit(
//!             Uuid::now_v7(),
//!             HabitCreate {
//!                 name: "Morning run".to_string(),
//!                 description: None,
//!                 color: Some("#FF5722".to_string()),
//!                 schedule: Schedule::Interval { days: 1 },
//!                 timezone_offset_hours: 2,
//!             },
//!         )
//!         .await?;
//!
//!     let (habit, _confirmation) = habits.confirm_habit(habit.id, habit.user_id, None).await?;
//!     println!("streak: {}", habit.streak);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod schedule;
pub mod sweeper;

pub use errors::{HabitError, HabitResult};
pub use manager::HabitManager;
pub use models::{
    Confirmation, Habit, HabitCreate, HabitStats, HabitUpdate, Schedule,
    MAX_TIMEZONE_OFFSET_HOURS, MIN_TIMEZONE_OFFSET_HOURS,
};
pub use sweeper::{DeadlineSweeper, SweeperHandle};

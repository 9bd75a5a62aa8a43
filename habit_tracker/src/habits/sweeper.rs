//! Background reconciliation of period boundaries.
//!
//! A single long-lived task ticks on an interval and runs the two manager
//! passes in order: flags reset before demotions, so a habit rolling into
//! a new period is never demoted in the same tick. Each tick is bounded by
//! a deadline; the loop owns the task state, so at most one run is ever in
//! flight. Shutdown is a watch-channel signal observed between and during
//! ticks.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::timeouts::SWEEPER_TICK_TIMEOUT;

use super::manager::HabitManager;

/// Periodic deadline sweeper
pub struct DeadlineSweeper {
    manager: HabitManager,
    interval: Duration,
}

/// Handle to a running sweeper; dropping it does not stop the task,
/// call [`SweeperHandle::stop`] for a clean shutdown.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task and wait for the in-flight tick to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "sweeper task join failed");
        }
    }
}

impl DeadlineSweeper {
    pub fn new(manager: HabitManager, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Spawn the sweeper loop
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(interval = ?self.interval, "deadline sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_tick().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("deadline sweeper stopped");
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// One bounded reconciliation tick. A crash between passes leaves a
    /// consistent state the next tick completes.
    async fn run_tick(&self) {
        let started = std::time::Instant::now();
        if tokio::time::timeout(SWEEPER_TICK_TIMEOUT, self.sweep())
            .await
            .is_err()
        {
            tracing::warn!("sweeper tick exceeded its deadline");
        }
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sweeper tick done"
        );
    }

    async fn sweep(&self) {
        let now = Utc::now();

        match self.manager.reset_confirmation_flags(now).await {
            Ok(cleared) if cleared > 0 => {
                tracing::info!(cleared, "confirmation flags reset for new periods")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "confirmation flag pass failed"),
        }

        match self.manager.process_missed_deadlines(now).await {
            Ok(demoted) if demoted > 0 => tracing::info!(demoted, "missed habits demoted"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "missed deadline pass failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryConfirmationRepository, MemoryHabitRepository};
    use crate::habits::{HabitCreate, Schedule};
    use std::sync::Arc;
    use uuid::Uuid;

    fn manager() -> HabitManager {
        HabitManager::new(
            Arc::new(MemoryHabitRepository::new()),
            Arc::new(MemoryConfirmationRepository::new()),
        )
    }

    #[tokio::test]
    async fn sweeper_starts_and_stops_cleanly() {
        let sweeper = DeadlineSweeper::new(manager(), Duration::from_millis(10));
        let handle = sweeper.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn sweeper_ticks_run_both_passes() {
        let habit_manager = manager();
        let user_id = Uuid::now_v7();
        habit_manager
            .create_habit(
                user_id,
                HabitCreate {
                    name: "Stretch".to_string(),
                    description: None,
                    color: None,
                    schedule: Schedule::Interval { days: 1 },
                    timezone_offset_hours: 0,
                },
            )
            .await
            .unwrap();

        // With the deadline still in the future, ticking must not touch
        // the habit.
        let sweeper = DeadlineSweeper::new(habit_manager.clone(), Duration::from_millis(5));
        let handle = sweeper.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;

        let habits = habit_manager.list_habits(user_id, true).await.unwrap();
        assert_eq!(habits[0].streak, 0);
        assert!(!habits[0].confirmed_for_current_period);
        assert!(habits[0].next_deadline_utc > Utc::now());
    }
}

//! Background loop firing scheduled tasks.
//!
//! A [`Scheduler`] is built from one snapshot of the schedule registry and
//! never looks at the registry again; callers stop it and start a new one
//! around every registry change. Each timer is a plain record holding its
//! own action, so firing never depends on shared loop state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::executor::ActionExecutor;
use crate::registry::schedules::check_interval;
use crate::registry::{ScheduledTask, TaskAction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    pub task_id: String,
    pub action: TaskAction,
    pub period: Duration,
    pub next_due: Instant,
}

/// Due-time table rebuilt from a registry snapshot.
#[derive(Debug, Default)]
pub struct TimerTable {
    timers: Vec<Timer>,
}

impl TimerTable {
    /// Arm one timer per task, first due one full period after `now`. Tasks
    /// whose interval is out of range or whose due time cannot be represented
    /// are skipped.
    pub fn build(snapshot: &[(String, ScheduledTask)], now: Instant) -> Self {
        let timers = snapshot
            .iter()
            .filter_map(|(id, task)| {
                let period = task.period();
                let next_due = check_interval(task.interval)
                    .ok()
                    .and_then(|_| now.checked_add(period));
                let Some(next_due) = next_due else {
                    warn!(target: "telepwn::scheduler", task_id = %id, interval = task.interval, "Skipping task with unusable interval");
                    return None;
                };
                Some(Timer {
                    task_id: id.clone(),
                    action: task.action,
                    period,
                    next_due,
                })
            })
            .collect();
        Self { timers }
    }

    /// Actions whose due time has passed, in table order. Each fired timer is
    /// re-armed one period after `now`; one that cannot be re-armed is dropped.
    pub fn fire_due(&mut self, now: Instant) -> Vec<(String, TaskAction)> {
        let mut due = Vec::new();
        self.timers.retain_mut(|timer| {
            if timer.next_due > now {
                return true;
            }
            due.push((timer.task_id.clone(), timer.action));
            match now.checked_add(timer.period) {
                Some(next) => {
                    timer.next_due = next;
                    true
                }
                None => {
                    warn!(target: "telepwn::scheduler", task_id = %timer.task_id, "Timer cannot be re-armed; dropping it");
                    false
                }
            }
        });
        due
    }

    pub fn timers(&self) -> &[Timer] {
        &self.timers
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

/// Handle to a running scheduler loop.
pub struct Scheduler {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Scheduler {
    pub fn start(
        snapshot: Vec<(String, ScheduledTask)>,
        executor: Arc<ActionExecutor>,
        poll: Duration,
    ) -> Self {
        let poll = poll.max(Duration::from_secs(1));
        let start = Instant::now();
        let mut table = TimerTable::build(&snapshot, start);
        info!(target: "telepwn::scheduler", timers = table.len(), poll_secs = poll.as_secs(), "Scheduler started");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(start + poll, poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let fired = table.fire_due(Instant::now());
                        if !fired.is_empty() {
                            debug!(target: "telepwn::scheduler", count = fired.len(), "Timers due");
                        }
                        // A stop request waits for these to finish.
                        for (task_id, action) in fired {
                            executor.run_scheduled(&task_id, action).await;
                        }
                    }
                }
            }
            debug!(target: "telepwn::scheduler", "Scheduler loop exited");
        });
        Self { cancel, task }
    }

    /// Stop firing and wait for the loop to exit. An action already running
    /// completes first.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(target: "telepwn::scheduler", error = %e, "Scheduler task failed");
        }
        info!(target: "telepwn::scheduler", "Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    fn task(action: TaskAction, interval: u64) -> ScheduledTask {
        ScheduledTask { action, interval }
    }

    #[tokio::test(start_paused = true)]
    async fn timers_fire_once_per_period() {
        let now = Instant::now();
        let mut table = TimerTable::build(&[("1".into(), task(TaskAction::Backup, 2))], now);
        assert!(table.fire_due(now + Duration::from_secs(7199)).is_empty());
        let fired = table.fire_due(now + Duration::from_secs(7200));
        assert_eq!(fired, vec![("1".to_string(), TaskAction::Backup)]);
        assert!(table.fire_due(now + Duration::from_secs(7300)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn each_timer_keeps_its_own_action() {
        let now = Instant::now();
        let mut table = TimerTable::build(
            &[
                ("1".into(), task(TaskAction::Reboot, 1)),
                ("2".into(), task(TaskAction::Backup, 1)),
            ],
            now,
        );
        let fired = table.fire_due(now + Duration::from_secs(3600));
        assert_eq!(
            fired,
            vec![("1".to_string(), TaskAction::Reboot), ("2".to_string(), TaskAction::Backup)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rebuilt_table_drops_removed_tasks() {
        let now = Instant::now();
        let latest = vec![("2".to_string(), task(TaskAction::Backup, 1))];
        let mut table = TimerTable::build(&latest, now);
        let fired = table.fire_due(now + Duration::from_secs(3600));
        assert_eq!(fired, vec![("2".to_string(), TaskAction::Backup)]);
        assert!(table.timers().iter().all(|t| t.task_id != "1"));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_intervals_are_skipped() {
        let now = Instant::now();
        let mut table = TimerTable::build(
            &[
                ("1".into(), task(TaskAction::Reboot, u64::MAX)),
                ("2".into(), task(TaskAction::Reboot, 0)),
                ("3".into(), task(TaskAction::Backup, 1)),
            ],
            now,
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.timers()[0].task_id, "3");
        assert_eq!(
            table.fire_due(now + Duration::from_secs(3600)),
            vec![("3".to_string(), TaskAction::Backup)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timer_that_cannot_be_rearmed_fires_then_drops() {
        let now = Instant::now();
        let mut table = TimerTable {
            timers: vec![Timer {
                task_id: "1".into(),
                action: TaskAction::Backup,
                period: Duration::MAX,
                next_due: now,
            }],
        };
        assert_eq!(table.fire_due(now), vec![("1".to_string(), TaskAction::Backup)]);
        assert!(table.is_empty());
        assert!(table.fire_due(now + Duration::from_secs(3600)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hand_edited_huge_interval_does_not_stop_other_timers() {
        let h = Harness::new();
        let scheduler = Scheduler::start(
            vec![
                ("1".into(), task(TaskAction::Backup, u64::MAX)),
                ("2".into(), task(TaskAction::Reboot, 1)),
            ],
            Arc::new(h.executor()),
            Duration::from_secs(60),
        );

        tokio::time::sleep(Duration::from_secs(3630)).await;
        assert_eq!(h.runner.calls(), vec!["sudo reboot"]);
        assert_eq!(h.transport.messages(), vec!["🔄 Scheduled reboot triggered..."]);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hourly_reboot_fires_exactly_once_per_hour() {
        let h = Harness::new();
        let scheduler = Scheduler::start(
            vec![("1".into(), task(TaskAction::Reboot, 1))],
            Arc::new(h.executor()),
            Duration::from_secs(60),
        );

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert!(h.transport.messages().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(h.transport.messages(), vec!["🔄 Scheduled reboot triggered..."]);
        assert_eq!(h.runner.calls(), vec!["sudo reboot"]);

        tokio::time::sleep(Duration::from_secs(3500)).await;
        assert_eq!(h.runner.calls().len(), 1);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(h.runner.calls().len(), 2);

        scheduler.stop().await;
        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(h.runner.calls().len(), 2);
    }
}

//! Recurring built-in tasks.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Registry, Table};
use crate::error::{DispatchError, DispatchResult};

/// Built-in actions a schedule can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    Reboot,
    Backup,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reboot => "reboot",
            Self::Backup => "backup",
        })
    }
}

impl FromStr for TaskAction {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reboot" => Ok(Self::Reboot),
            "backup" => Ok(Self::Backup),
            _ => Err(DispatchError::validation(
                "Invalid action. Use 'reboot' or 'backup'.",
            )),
        }
    }
}

/// A persisted recurring task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub action: TaskAction,
    /// Hours between two runs.
    pub interval: u64,
}

/// Longest accepted interval, a century of hours.
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365 * 100;

/// Reject intervals outside `1..=MAX_INTERVAL_HOURS`.
pub fn check_interval(interval: u64) -> DispatchResult<u64> {
    if (1..=MAX_INTERVAL_HOURS).contains(&interval) {
        Ok(interval)
    } else {
        Err(DispatchError::validation(format!(
            "Interval must be between 1 and {MAX_INTERVAL_HOURS} hours."
        )))
    }
}

/// Parse a user-supplied hour count. Anything that is not a whole number
/// in range gets the same message as an out-of-range value.
pub fn parse_interval(raw: &str) -> DispatchResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| DispatchError::validation(format!(
            "Interval must be between 1 and {MAX_INTERVAL_HOURS} hours."
        )))
        .and_then(check_interval)
}

impl ScheduledTask {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval.saturating_mul(3600))
    }
}

/// Registry of scheduled tasks keyed by id.
#[derive(Debug)]
pub struct ScheduleRegistry {
    inner: Registry<ScheduledTask>,
}

impl ScheduleRegistry {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Registry::open(path),
        }
    }

    /// Id for the next task: current size + 1, moved past any id still in
    /// use so a removal never lets a new task overwrite a live one.
    pub fn next_id(&self) -> String {
        let mut candidate = self.inner.len() + 1;
        while self.inner.contains(&candidate.to_string()) {
            candidate += 1;
        }
        candidate.to_string()
    }

    /// Add a task and persist it. Returns the assigned id.
    pub fn add(&mut self, action: TaskAction, interval: u64) -> DispatchResult<String> {
        check_interval(interval)?;
        let id = self.next_id();
        self.inner.insert(&id, ScheduledTask { action, interval })?;
        info!(target: "telepwn::registry", %id, %action, interval, "Scheduled task added");
        Ok(id)
    }

    /// Remove a task and persist. Unknown ids are a validation error.
    pub fn remove(&mut self, id: &str) -> DispatchResult<ScheduledTask> {
        let removed = self
            .inner
            .remove(id)?
            .ok_or_else(|| DispatchError::validation(format!("Task ID {id} not found.")))?;
        info!(target: "telepwn::registry", %id, "Scheduled task removed");
        Ok(removed)
    }

    pub fn entries(&self) -> &Table<ScheduledTask> {
        self.inner.entries()
    }

    /// Owned copy of the current table, ordered by numeric id.
    pub fn snapshot(&self) -> Vec<(String, ScheduledTask)> {
        let mut tasks: Vec<_> = self
            .inner
            .entries()
            .iter()
            .map(|(id, task)| (id.clone(), task.clone()))
            .collect();
        tasks.sort_by_key(|(id, _)| (id.parse::<u64>().unwrap_or(u64::MAX), id.clone()));
        tasks
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn add_list_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schedules.toml");
        let mut reg = ScheduleRegistry::open(&path);

        let id = reg.add(TaskAction::Backup, 24).unwrap();
        assert_eq!(id, "1");
        let listed = ScheduleRegistry::open(&path).snapshot();
        assert_eq!(
            listed,
            vec![("1".to_string(), ScheduledTask { action: TaskAction::Backup, interval: 24 })]
        );

        reg.remove(&id).unwrap();
        assert!(ScheduleRegistry::open(&path).is_empty());
    }

    #[test]
    fn ids_skip_live_entries_after_removal() {
        let dir = TempDir::new().unwrap();
        let mut reg = ScheduleRegistry::open(dir.path().join("s.toml"));
        reg.add(TaskAction::Reboot, 1).unwrap();
        reg.add(TaskAction::Backup, 2).unwrap();
        reg.remove("1").unwrap();
        let id = reg.add(TaskAction::Reboot, 3).unwrap();
        assert_eq!(id, "3");
        assert_eq!(reg.entries().get("2").unwrap().interval, 2);
    }

    #[test]
    fn zero_interval_and_unknown_id_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut reg = ScheduleRegistry::open(dir.path().join("s.toml"));
        assert!(matches!(reg.add(TaskAction::Reboot, 0), Err(DispatchError::Validation(_))));
        assert!(matches!(reg.remove("9"), Err(DispatchError::Validation(_))));
    }

    #[test]
    fn oversized_intervals_are_rejected_and_not_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.toml");
        let mut reg = ScheduleRegistry::open(&path);
        for interval in [MAX_INTERVAL_HOURS + 1, i64::MAX as u64, u64::MAX] {
            let Err(DispatchError::Validation(msg)) = reg.add(TaskAction::Reboot, interval) else {
                panic!("interval {interval} should be rejected");
            };
            assert!(msg.contains("between 1 and"));
        }
        assert!(reg.is_empty());
        assert!(ScheduleRegistry::open(&path).is_empty());

        assert_eq!(reg.add(TaskAction::Backup, MAX_INTERVAL_HOURS).unwrap(), "1");
    }

    #[test]
    fn interval_text_must_be_a_whole_number_in_range() {
        assert_eq!(parse_interval(" 12 ").unwrap(), 12);
        for raw in ["0", "-1", "1.5", "abc", "9223372036854775807", "99999999999999999999"] {
            assert!(
                matches!(parse_interval(raw), Err(DispatchError::Validation(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn snapshot_orders_numerically() {
        let dir = TempDir::new().unwrap();
        let mut reg = ScheduleRegistry::open(dir.path().join("s.toml"));
        for _ in 0..11 {
            reg.add(TaskAction::Reboot, 1).unwrap();
        }
        let ids: Vec<_> = reg.snapshot().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids.first().map(String::as_str), Some("1"));
        assert_eq!(ids.last().map(String::as_str), Some("11"));
    }

    #[test]
    fn period_is_hours() {
        let t = ScheduledTask { action: TaskAction::Reboot, interval: 2 };
        assert_eq!(t.period(), Duration::from_secs(7200));
    }
}

// src/registry/task.rs

//! Task definitions and the defaults cascade.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::model::{TaskDefaults, TriggerSpec};

/// Canonical task identifier: `collection.name`.
pub type TaskId = String;

/// How many exit codes each task remembers.
pub const EXIT_CODE_HISTORY: usize = 10;

/// Success/error classification of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Error,
}

impl TaskStatus {
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            TaskStatus::Success
        } else {
            TaskStatus::Error
        }
    }
}

/// Normalized trigger held in the registry: exactly one condition.
///
/// Reference patterns are qualified at normalization time, so `After` and
/// `AfterFailed` always hold a full task id or a wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Cron expression.
    Time(String),
    /// Pattern that must complete successfully first.
    After(String),
    /// Pattern whose failure triggers this task.
    AfterFailed(String),
}

impl Trigger {
    /// Cron expression, if this is a timed trigger.
    pub fn time(&self) -> Option<&str> {
        match self {
            Trigger::Time(expr) => Some(expr),
            _ => None,
        }
    }

    /// The reference pattern relevant to `status`, if any.
    pub fn reference(&self, status: TaskStatus) -> Option<&str> {
        match (self, status) {
            (Trigger::After(pattern), TaskStatus::Success) => Some(pattern),
            (Trigger::AfterFailed(pattern), TaskStatus::Error) => Some(pattern),
            _ => None,
        }
    }

    /// Wire representation for documents and API responses.
    pub fn to_spec(&self) -> TriggerSpec {
        let (time, after, after_failed) = match self {
            Trigger::Time(expr) => (Some(expr.clone()), None, None),
            Trigger::After(pattern) => (None, Some(pattern.clone()), None),
            Trigger::AfterFailed(pattern) => (None, None, Some(pattern.clone())),
        };
        TriggerSpec::Fields {
            time,
            after,
            after_failed,
        }
    }
}

/// A registered task.
#[derive(Debug, Clone)]
pub struct Task {
    /// `collection.name`; immutable once created.
    pub id: TaskId,
    pub name: String,
    pub collection: String,
    pub command: String,
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
    /// No trigger means the task only runs manually.
    pub trigger: Option<Trigger>,
    pub enabled: bool,
    /// Ring of the most recent exit codes, oldest first.
    pub recent_exit_codes: VecDeque<i32>,
    pub last_successful_run: Option<DateTime<Utc>>,
}

impl Task {
    /// Record a completed run's exit code, evicting beyond
    /// [`EXIT_CODE_HISTORY`].
    pub fn record_exit(&mut self, code: i32, completed: DateTime<Utc>) {
        self.recent_exit_codes.push_back(code);
        while self.recent_exit_codes.len() > EXIT_CODE_HISTORY {
            self.recent_exit_codes.pop_front();
        }
        if code == 0 {
            self.last_successful_run = Some(completed);
        }
    }
}

/// Partial task configuration for create/update calls.
///
/// `create_task` requires `name` and `command`; `update_task` merges only
/// the fields that are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    pub name: Option<String>,
    pub collection: Option<String>,
    pub command: Option<String>,
    pub cwd: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
    pub trigger: Option<TriggerSpec>,
    pub enabled: Option<bool>,
}

/// Frozen, defaults-merged view of a task, held by a [`crate::run::Run`].
///
/// Snapshotting at enqueue time means later task edits never reach runs
/// that are already queued or executing.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    /// `None` for ad-hoc (forced arbitrary command) runs.
    pub id: Option<TaskId>,
    pub command: String,
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl TaskSnapshot {
    /// Snapshot for an arbitrary command with no registered task.
    pub fn adhoc(command: impl Into<String>) -> Self {
        Self {
            id: None,
            command: command.into(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }
}

/// Three-level defaults cascade: explicit task fields win over collection
/// defaults, which win over global defaults. `env` merges key-wise with
/// the same precedence.
pub fn merge_defaults(
    task: &Task,
    collection: &TaskDefaults,
    global: &TaskDefaults,
) -> TaskSnapshot {
    let cwd = task
        .cwd
        .clone()
        .or_else(|| collection.cwd.clone())
        .or_else(|| global.cwd.clone());

    let mut env = global.env.clone();
    env.extend(collection.env.clone());
    env.extend(task.env.clone());

    TaskSnapshot {
        id: Some(task.id.clone()),
        command: task.command.clone(),
        cwd,
        env,
    }
}

// src/run.rs

//! A [`Run`] is one execution attempt of a task (or an ad-hoc command).
//!
//! Runs are created when something is pushed onto the queue, carry a frozen
//! snapshot of the task at that moment, and are mutated in place by the
//! scheduler as the process starts and completes. They are never deleted
//! explicitly; a run is dropped once it has left the queue and its worker
//! bookkeeping is discarded.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::registry::task::TaskSnapshot;

pub type RunId = String;

/// What caused a run to be enqueued.
#[derive(Debug, Clone)]
pub enum TriggeredBy {
    Manual,
    Timer,
    /// The upstream run whose completion triggered this one.
    Run(Box<Run>),
}

impl TriggeredBy {
    /// Dependency-triggered pushes bypass queue dedup.
    pub fn is_dependency(&self) -> bool {
        matches!(self, TriggeredBy::Run(_))
    }

    pub fn upstream(&self) -> Option<&Run> {
        match self {
            TriggeredBy::Run(run) => Some(run),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TriggeredBy::Manual => "manual",
            TriggeredBy::Timer => "timer",
            TriggeredBy::Run(_) => "run",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Run {
    pub id: RunId,
    /// Frozen snapshot of the task at enqueue time, defaults merged.
    pub task: TaskSnapshot,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    /// OS process id, once the worker has spawned.
    pub pid: Option<u32>,
    pub triggered_by: TriggeredBy,
}

impl Run {
    /// Create a run, rendering any `{{...}}` markers in the command with
    /// the new run in scope.
    pub fn new(task: TaskSnapshot, triggered_by: TriggeredBy) -> Self {
        let mut run = Self {
            id: Uuid::new_v4().to_string(),
            task,
            created: Utc::now(),
            started: None,
            completed: None,
            exit_code: None,
            pid: None,
            triggered_by,
        };

        if template::has_markers(&run.task.command) {
            let rendered = template::render(&run.task.command, &run);
            run.task.command = rendered;
        }

        run
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task.id.as_deref()
    }

    pub fn start(&mut self) {
        self.started = Some(Utc::now());
    }

    pub fn complete(&mut self, exit_code: i32) {
        self.completed = Some(Utc::now());
        self.exit_code = Some(exit_code);
    }

    /// Elapsed milliseconds from start to completion, or to now while
    /// still running. `None` before the run has started.
    pub fn duration_ms(&self) -> Option<i64> {
        let started = self.started?;
        let end = self.completed.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds())
    }
}

pub mod template {
    //! `{{...}}` markers in task commands, rendered once at run creation.
    //!
    //! This is what lets an `afterFailed` task report which run failed:
    //!
    //! ```text
    //! command = "notify-failure --run {{run.triggeredBy.id}}"
    //! ```

    use std::sync::OnceLock;

    use regex::{Captures, Regex};
    use tracing::debug;

    use super::Run;

    fn marker_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z.]+)\s*\}\}").expect("valid marker regex"))
    }

    pub fn has_markers(command: &str) -> bool {
        command.contains("{{")
    }

    /// Replace known markers; unknown ones are left untouched.
    pub fn render(command: &str, run: &Run) -> String {
        marker_re()
            .replace_all(command, |caps: &Captures| match lookup(&caps[1], run) {
                Some(value) => value,
                None => {
                    debug!(marker = &caps[1], "unknown template marker left as-is");
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    fn lookup(path: &str, run: &Run) -> Option<String> {
        match path {
            "run.id" => Some(run.id.clone()),
            "run.task.id" => run.task_id().map(str::to_string),
            "run.triggeredBy" => Some(run.triggered_by.label().to_string()),
            "run.triggeredBy.id" => run.triggered_by.upstream().map(|r| r.id.clone()),
            "run.triggeredBy.task.id" => run
                .triggered_by
                .upstream()
                .and_then(Run::task_id)
                .map(str::to_string),
            "run.triggeredBy.exitCode" => run
                .triggered_by
                .upstream()
                .and_then(|r| r.exit_code)
                .map(|code| code.to_string()),
            _ => None,
        }
    }
}

// src/engine/mod.rs

//! Scheduler loop and worker pool.
//!
//! This module ties together:
//! - the task registry and the run queue
//! - admission control (worker cap, pause flag, skip-if-running)
//! - completion handling: exit-code bookkeeping and triggering of
//!   dependent tasks
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. Timers and workers never touch state
//! directly; they send [`EngineEvent`]s consumed by the single engine
//! loop.

use std::time::Duration;

use crate::registry::task::TaskId;
use crate::run::{Run, RunId};

/// Events flowing into the engine loop from timers, workers and the
/// scheduler handle.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A cron timer ticked for this task.
    TimerFired { task: TaskId },
    /// Something was pushed onto the queue; check admissions.
    RunEnqueued,
    /// A worker spawned its OS process.
    WorkerStarted { run: RunId, pid: u32 },
    /// A worker's OS process exited (or failed to spawn; exit code -1).
    WorkerCompleted { run: RunId, exit_code: i32 },
    /// Explicit admission check, equivalent to a poll tick.
    Poll,
    /// Graceful shutdown: stop admissions, signal children, drain.
    ShutdownRequested,
}

/// Notifications fanned out to collaborators (persistence, status
/// surfaces). Nothing in the core depends on anyone listening.
#[derive(Debug, Clone)]
pub enum Notice {
    TaskNew(TaskId),
    TaskUpdated(TaskId),
    TaskDeleted(TaskId),
    QueueNew(Run),
    QueueShifted(Run),
    WorkerStart(Run),
    WorkerComplete(Run),
}

/// Options shared by the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Concurrent worker cap.
    pub max_workers: usize,
    /// Safety-net admission check interval.
    pub poll_interval: Duration,
    /// Start with admissions paused.
    pub start_paused: bool,
    /// Exit the loop once nothing is queued or running (used by tests and
    /// one-shot invocations).
    pub exit_when_idle: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_workers: 1,
            poll_interval: Duration::from_millis(1000),
            start_paused: false,
            exit_when_idle: false,
        }
    }
}

pub mod core;
pub mod runtime;

pub use self::core::{CompletionOutcome, EngineCore};
pub use runtime::Engine;

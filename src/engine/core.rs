// src/engine/core.rs

//! Pure scheduler core.
//!
//! This is a synchronous, deterministic state holder for everything the
//! scheduler owns: the task registry, the run queue, the in-flight worker
//! map, the worker cap and the pause flag. It has no channels, no Tokio
//! types, and performs no IO, so admission and completion semantics can be
//! unit tested without a runtime.
//!
//! The async shell ([`super::runtime::Engine`]) and the public handle
//! ([`crate::scheduler::Scheduler`]) share one core behind a mutex; every
//! decision that reads or writes scheduler state happens under that lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, warn};

use crate::engine::EngineOptions;
use crate::errors::Result;
use crate::queue::{Pushed, RunQueue};
use crate::registry::TaskRegistry;
use crate::registry::task::{TaskId, TaskStatus};
use crate::run::{Run, RunId, TriggeredBy};

/// Result of handling a worker completion.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// The completed run, timestamps and exit code filled in.
    pub run: Run,
    /// Dependency-triggered runs that were pushed onto the queue.
    pub triggered: Vec<Run>,
}

#[derive(Debug)]
pub struct EngineCore {
    registry: TaskRegistry,
    queue: RunQueue,
    /// In-flight runs, keyed by run id (the OS pid arrives later, via
    /// `WorkerStarted`, and is recorded on the run).
    workers: HashMap<RunId, Run>,
    max_workers: usize,
    paused: bool,
}

/// The core as shared between the engine loop and the scheduler handle.
pub type SharedCore = Arc<Mutex<EngineCore>>;

/// Lock the shared core, recovering from a poisoned mutex.
pub fn lock_core(core: &SharedCore) -> MutexGuard<'_, EngineCore> {
    core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EngineCore {
    pub fn new(registry: TaskRegistry, queue_size: usize, options: &EngineOptions) -> Self {
        Self {
            registry,
            queue: RunQueue::new(queue_size),
            workers: HashMap::new(),
            max_workers: options.max_workers.max(1),
            paused: options.start_paused,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TaskRegistry {
        &mut self.registry
    }

    pub fn queue(&self) -> &RunQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut RunQueue {
        &mut self.queue
    }

    // ---------------------------------------------------------------
    // Admission
    // ---------------------------------------------------------------

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Nothing queued and nothing running.
    pub fn is_idle(&self) -> bool {
        self.workers.is_empty() && self.queue.is_empty()
    }

    /// Can another worker be admitted right now?
    pub fn ready(&self) -> bool {
        !self.paused && self.workers.len() < self.max_workers && self.queue.has_next()
    }

    /// Task ids with a worker currently executing.
    pub fn running_task_ids(&self) -> HashSet<TaskId> {
        self.workers
            .values()
            .filter_map(Run::task_id)
            .map(str::to_string)
            .collect()
    }

    /// Admit the next eligible run, if capacity allows: removes it from
    /// the queue, stamps its start time and moves it into the worker map.
    pub fn next_admission(&mut self) -> Option<Run> {
        if !self.ready() {
            return None;
        }

        let running = self.running_task_ids();
        let mut run = self.queue.get_next(&running)?;
        run.start();
        self.workers.insert(run.id.clone(), run.clone());
        Some(run)
    }

    // ---------------------------------------------------------------
    // Enqueueing
    // ---------------------------------------------------------------

    /// Snapshot a registered task and push a run for it.
    pub fn enqueue_task(&mut self, id: &str, triggered_by: TriggeredBy) -> Result<Pushed> {
        let snapshot = self.registry.snapshot(id)?;
        self.queue.push(Run::new(snapshot, triggered_by))
    }

    /// A timer tick: push a timer-triggered run unless the task vanished
    /// or was disabled since the timer was installed.
    pub fn handle_timer_fired(&mut self, id: &str) -> Result<Option<Run>> {
        match self.registry.get_task(id) {
            Ok(task) if self.registry.is_task_enabled(task) => {}
            Ok(_) => {
                debug!(task = %id, "timer fired for disabled task; ignoring");
                return Ok(None);
            }
            Err(_) => {
                warn!(task = %id, "timer fired for unknown task; ignoring");
                return Ok(None);
            }
        }

        match self.enqueue_task(id, TriggeredBy::Timer)? {
            Pushed::Enqueued(run) => Ok(Some(run)),
            Pushed::Suppressed(_) => Ok(None),
        }
    }

    // ---------------------------------------------------------------
    // Worker lifecycle
    // ---------------------------------------------------------------

    /// Record the OS pid of a spawned worker.
    pub fn handle_worker_started(&mut self, run_id: &str, pid: u32) {
        match self.workers.get_mut(run_id) {
            Some(run) => run.pid = Some(pid),
            None => warn!(run = %run_id, pid, "start report for unknown worker"),
        }
    }

    /// Handle a worker's exit: update the originating task's exit-code
    /// history, and push a run for every task referencing it with the
    /// matching status. References whose effective enablement is off are
    /// skipped; ad-hoc runs propagate nothing.
    pub fn handle_worker_completed(
        &mut self,
        run_id: &str,
        exit_code: i32,
    ) -> Option<CompletionOutcome> {
        let Some(mut run) = self.workers.remove(run_id) else {
            warn!(run = %run_id, exit_code, "completion report for unknown worker");
            return None;
        };

        run.complete(exit_code);

        let mut triggered = Vec::new();
        if let Some(task_id) = run.task_id().map(str::to_string) {
            self.registry
                .record_task_exit(&task_id, exit_code, Utc::now());

            let status = TaskStatus::from_exit_code(exit_code);
            for reference in self.registry.references(&task_id, status) {
                let live = self
                    .registry
                    .get_task(&reference)
                    .map(|t| self.registry.is_task_enabled(t))
                    .unwrap_or(false);
                if !live {
                    debug!(task = %reference, completed = %task_id, "skipping disabled reference");
                    continue;
                }

                debug!(task = %reference, completed = %task_id, "run triggered by completion");
                let triggered_by = TriggeredBy::Run(Box::new(run.clone()));
                match self.enqueue_task(&reference, triggered_by) {
                    Ok(Pushed::Enqueued(new_run)) => triggered.push(new_run),
                    Ok(Pushed::Suppressed(_)) => {}
                    Err(err) => {
                        warn!(task = %reference, %err, "could not queue dependent task");
                    }
                }
            }
        }

        Some(CompletionOutcome { run, triggered })
    }

    // ---------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------

    /// Snapshot of in-flight and queued runs, in that order.
    pub fn runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.workers.values().cloned().collect();
        runs.sort_by_key(|run| run.created);
        runs.extend(self.queue.iter().cloned());
        runs
    }
}

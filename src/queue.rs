// src/queue.rs

//! The run queue: a bounded FIFO of runs waiting for a worker.
//!
//! Semantics:
//! - `push` rejects with `QueueFull` at capacity and suppresses bare
//!   re-fires of a task that is already waiting (a timer ticking faster
//!   than its task finishes must not grow the queue without bound).
//!   Dependency-triggered pushes always enqueue.
//! - `get_next` is FIFO, skipping tasks that are currently executing so a
//!   task never runs twice concurrently.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::errors::{CrondagError, Result};
use crate::registry::task::TaskId;
use crate::run::Run;

/// Outcome of a push that did not fail.
#[derive(Debug, Clone)]
pub enum Pushed {
    /// The run was appended to the queue.
    Enqueued(Run),
    /// A run for the same task was already waiting and the push was not
    /// dependency-triggered; the waiting run is returned instead.
    Suppressed(Run),
}

impl Pushed {
    pub fn run(&self) -> &Run {
        match self {
            Pushed::Enqueued(run) | Pushed::Suppressed(run) => run,
        }
    }

    pub fn is_enqueued(&self) -> bool {
        matches!(self, Pushed::Enqueued(_))
    }
}

#[derive(Debug)]
pub struct RunQueue {
    items: VecDeque<Run>,
    max_size: usize,
}

impl RunQueue {
    /// `max_size` is clamped to at least 1.
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Append a run, applying duplicate suppression and the capacity bound.
    pub fn push(&mut self, run: Run) -> Result<Pushed> {
        if !run.triggered_by.is_dependency()
            && let Some(task_id) = run.task_id()
            && let Some(existing) = self.items.iter().find(|r| r.task_id() == Some(task_id))
        {
            debug!(
                task = %task_id,
                queued_run = %existing.id,
                "run for task already queued; suppressing duplicate push"
            );
            return Ok(Pushed::Suppressed(existing.clone()));
        }

        if self.items.len() >= self.max_size {
            return Err(CrondagError::QueueFull {
                capacity: self.max_size,
            });
        }

        self.items.push_back(run.clone());
        Ok(Pushed::Enqueued(run))
    }

    /// Remove and return the first run whose task is not in `running`.
    /// Ad-hoc runs carry no task id and are always eligible.
    pub fn get_next(&mut self, running: &HashSet<TaskId>) -> Option<Run> {
        let index = self.items.iter().position(|run| {
            run.task_id()
                .map(|id| !running.contains(id))
                .unwrap_or(true)
        })?;
        self.items.remove(index)
    }

    /// Drop queued runs for one task, or all of them. Returns how many
    /// were removed.
    pub fn clear(&mut self, task_id: Option<&str>) -> usize {
        let before = self.items.len();
        match task_id {
            Some(id) => self.items.retain(|run| run.task_id() != Some(id)),
            None => self.items.clear(),
        }
        before - self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        !self.items.is_empty()
    }

    /// Distinct task ids currently waiting, in queue order.
    pub fn present_task_ids(&self) -> Vec<TaskId> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .filter_map(Run::task_id)
            .filter(|id| seen.insert(id.to_string()))
            .map(str::to_string)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Run> {
        self.items.iter()
    }
}

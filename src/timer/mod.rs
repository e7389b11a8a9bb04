// src/timer/mod.rs

//! Cron timer subsystem: one background sleeper per time-triggered task.
//!
//! Each installed timer sleeps until the next fire of its schedule and
//! sends [`EngineEvent::TimerFired`]; the engine loop does the actual
//! queue push, so timers never touch registry or queue state. Overlap
//! policy (a timer ticking while its previous run is still queued or
//! executing) lives entirely in the queue's dedup and skip-if-running
//! rules.

pub mod cron;

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::EngineEvent;
use crate::registry::task::TaskId;

#[derive(Debug)]
struct TimerHandle {
    expression: String,
    handle: JoinHandle<()>,
}

/// Owns the live cron timers.
///
/// [`TimerSet::sync`] reconciles the installed set against the registry's
/// desired set after every task/collection mutation, which is what tears
/// timers down on update/disable/delete and reinstalls them on enable.
#[derive(Debug)]
pub struct TimerSet {
    events_tx: mpsc::Sender<EngineEvent>,
    timers: HashMap<TaskId, TimerHandle>,
}

impl TimerSet {
    pub fn new(events_tx: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            events_tx,
            timers: HashMap::new(),
        }
    }

    /// Install missing timers and tear down ones that are gone or whose
    /// expression changed.
    pub fn sync(&mut self, desired: Vec<(TaskId, String)>) {
        let desired: HashMap<TaskId, String> = desired.into_iter().collect();

        let stale: Vec<TaskId> = self
            .timers
            .iter()
            .filter(|(id, timer)| desired.get(*id) != Some(&timer.expression))
            .map(|(id, _)| id.clone())
            .collect();

        for id in stale {
            if let Some(timer) = self.timers.remove(&id) {
                debug!(task = %id, "stopping timer");
                timer.handle.abort();
            }
        }

        for (id, expression) in desired {
            if !self.timers.contains_key(&id) {
                self.install(id, expression);
            }
        }
    }

    fn install(&mut self, id: TaskId, expression: String) {
        let schedule = match cron::parse(&expression) {
            Ok(schedule) => schedule,
            Err(err) => {
                // The task stays usable for manual and dependency triggers.
                warn!(task = %id, %expression, %err, "not installing timer");
                return;
            }
        };

        debug!(task = %id, %expression, "installing timer");

        let events_tx = self.events_tx.clone();
        let task = id.clone();
        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = schedule.next_fire(now) else {
                    warn!(task = %task, "cron expression never fires again; stopping timer");
                    return;
                };

                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                if events_tx
                    .send(EngineEvent::TimerFired { task: task.clone() })
                    .await
                    .is_err()
                {
                    // Engine loop is gone; nothing left to notify.
                    return;
                }
            }
        });

        self.timers.insert(id, TimerHandle { expression, handle });
    }

    /// Task ids with a live timer, sorted (diagnostics and tests).
    pub fn active_task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.timers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn shutdown(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// src/scheduler.rs

//! The orchestrator handle.
//!
//! [`Scheduler`] is the one explicitly-constructed object collaborators
//! hold (CLI, store, status surfaces). It shares the [`EngineCore`] with
//! the engine loop behind a mutex, owns the cron [`TimerSet`], and fans
//! [`Notice`]s out to subscribers. Every mutation re-syncs the timer set
//! against the registry, which is how trigger updates, enable/disable and
//! collection cascades reach the timers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::config::model::{CollectionDoc, Settings};
use crate::engine::core::{EngineCore, SharedCore, lock_core};
use crate::engine::{Engine, EngineEvent, EngineOptions, Notice};
use crate::errors::{CrondagError, Result};
use crate::exec::{ProcessBackend, WorkerBackend};
use crate::registry::TaskRegistry;
use crate::registry::task::{Task, TaskConfig, TaskId, TaskSnapshot, TaskStatus};
use crate::run::{Run, TriggeredBy};
use crate::timer::TimerSet;

pub struct Scheduler {
    core: SharedCore,
    events_tx: mpsc::Sender<EngineEvent>,
    notices: broadcast::Sender<Notice>,
    timers: Mutex<TimerSet>,
}

impl Scheduler {
    /// Build the scheduler handle and its engine loop from settings. The
    /// engine must be driven (`engine.run().await`) for anything to
    /// execute.
    pub fn new(settings: &Settings) -> (Arc<Self>, Engine<ProcessBackend>) {
        let options = EngineOptions {
            max_workers: settings.config.effective_max_workers(),
            poll_interval: Duration::from_millis(settings.config.poll_interval_ms.max(1)),
            start_paused: settings.config.pause,
            exit_when_idle: false,
        };
        Self::with_options(settings, options)
    }

    /// Like [`Scheduler::new`] with explicit engine options.
    pub fn with_options(
        settings: &Settings,
        options: EngineOptions,
    ) -> (Arc<Self>, Engine<ProcessBackend>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let backend = ProcessBackend::new(events_tx.clone());
        Self::with_backend(settings, options, events_tx, events_rx, backend)
    }

    /// Fully explicit construction; tests use this to substitute a fake
    /// worker backend.
    pub fn with_backend<B: WorkerBackend>(
        settings: &Settings,
        options: EngineOptions,
        events_tx: mpsc::Sender<EngineEvent>,
        events_rx: mpsc::Receiver<EngineEvent>,
        backend: B,
    ) -> (Arc<Self>, Engine<B>) {
        let registry = TaskRegistry::new(
            settings.config.default_collection.clone(),
            settings.defaults.clone(),
        );
        let core: SharedCore = Arc::new(Mutex::new(EngineCore::new(
            registry,
            settings.config.queue_size,
            &options,
        )));
        let (notices, _) = broadcast::channel(64);

        let engine = Engine::new(
            core.clone(),
            events_rx,
            backend,
            notices.clone(),
            &options,
        );

        let scheduler = Arc::new(Self {
            core,
            events_tx: events_tx.clone(),
            notices,
            timers: Mutex::new(TimerSet::new(events_tx)),
        });

        (scheduler, engine)
    }

    /// Subscribe to task/queue/worker notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    // ---------------------------------------------------------------
    // Task lifecycle
    // ---------------------------------------------------------------

    pub fn create_task(&self, config: TaskConfig) -> Result<Task> {
        let task = lock_core(&self.core).registry_mut().create_task(config)?;
        self.emit(Notice::TaskNew(task.id.clone()));
        self.sync_timers();
        Ok(task)
    }

    pub fn update_task(&self, id: &str, config: TaskConfig) -> Result<Task> {
        let task = lock_core(&self.core)
            .registry_mut()
            .update_task(id, config)?;
        self.emit(Notice::TaskUpdated(task.id.clone()));
        self.sync_timers();
        Ok(task)
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        lock_core(&self.core).registry_mut().delete_task(id)?;
        self.emit(Notice::TaskDeleted(id.to_string()));
        self.sync_timers();
        Ok(())
    }

    /// Delete a collection and all its tasks. Returns the removed ids.
    pub fn delete_collection(&self, name: &str) -> Result<Vec<TaskId>> {
        let removed = lock_core(&self.core).registry_mut().delete_collection(name)?;
        for id in &removed {
            self.emit(Notice::TaskDeleted(id.clone()));
        }
        self.sync_timers();
        Ok(removed)
    }

    /// A task with the defaults cascade applied.
    pub fn get_task(&self, id: &str) -> Result<Task> {
        lock_core(&self.core).registry().resolved_task(id)
    }

    /// Collection views filtered by task id, collection name, or nothing.
    pub fn get_tasks(&self, filter: Option<&str>) -> Result<Vec<CollectionDoc>> {
        lock_core(&self.core).registry().collection_docs(filter)
    }

    pub fn get_task_references(&self, id: &str, status: TaskStatus) -> Vec<TaskId> {
        lock_core(&self.core).registry().references(id, status)
    }

    pub fn get_task_dependencies(&self, id: &str, status: TaskStatus) -> Result<Vec<TaskId>> {
        lock_core(&self.core).registry().dependencies(id, status)
    }

    // ---------------------------------------------------------------
    // Enablement
    // ---------------------------------------------------------------

    pub fn enable_task(&self, id: &str) -> Result<Vec<TaskId>> {
        self.set_task_enabled(id, true)
    }

    pub fn disable_task(&self, id: &str) -> Result<Vec<TaskId>> {
        self.set_task_enabled(id, false)
    }

    fn set_task_enabled(&self, id: &str, enabled: bool) -> Result<Vec<TaskId>> {
        let changed = lock_core(&self.core)
            .registry_mut()
            .set_task_enabled(id, enabled)?;
        self.emit(Notice::TaskUpdated(id.to_string()));
        self.sync_timers();
        Ok(changed)
    }

    pub fn enable_collection(&self, name: &str) -> Result<Vec<TaskId>> {
        self.set_collection_enabled(name, true)
    }

    pub fn disable_collection(&self, name: &str) -> Result<Vec<TaskId>> {
        self.set_collection_enabled(name, false)
    }

    fn set_collection_enabled(&self, name: &str, enabled: bool) -> Result<Vec<TaskId>> {
        let changed = lock_core(&self.core)
            .registry_mut()
            .set_collection_enabled(name, enabled)?;
        for id in &changed {
            self.emit(Notice::TaskUpdated(id.clone()));
        }
        self.sync_timers();
        Ok(changed)
    }

    // ---------------------------------------------------------------
    // Running
    // ---------------------------------------------------------------

    /// Manual trigger: run a registered task by id or bare name, or (with
    /// `force`) an arbitrary command.
    ///
    /// Without `force`, a registered task with live success-tree dependents
    /// is rejected (`DependentTaskExists`), and an unknown target is
    /// `NotFound` unless it is visibly a command line, which asks for
    /// `force` instead.
    pub fn run_task(&self, target: &str, force: bool) -> Result<Run> {
        let pushed = {
            let mut core = lock_core(&self.core);
            match core.registry().find_task_id(target, None) {
                Some(id) => {
                    if !force {
                        let dependents = core.registry().references(&id, TaskStatus::Success);
                        if !dependents.is_empty() {
                            return Err(CrondagError::DependentTaskExists {
                                task: id,
                                dependents,
                            });
                        }
                    }
                    core.enqueue_task(&id, TriggeredBy::Manual)?
                }
                None if force => core
                    .queue_mut()
                    .push(Run::new(TaskSnapshot::adhoc(target), TriggeredBy::Manual))?,
                None if target.contains(char::is_whitespace) => {
                    return Err(CrondagError::ForcedCommandRequired);
                }
                None => return Err(CrondagError::NotFound(target.to_string())),
            }
        };

        if pushed.is_enqueued() {
            self.emit(Notice::QueueNew(pushed.run().clone()));
            self.notify_enqueued();
        } else {
            debug!(target, "manual run suppressed; returning already-queued run");
        }

        Ok(pushed.run().clone())
    }

    /// Snapshot of in-flight and queued runs.
    pub fn get_runs(&self) -> Vec<Run> {
        lock_core(&self.core).runs()
    }

    /// Drop queued runs for one task, or all of them.
    pub fn clear_queue(&self, task_id: Option<&str>) -> usize {
        lock_core(&self.core).queue_mut().clear(task_id)
    }

    pub fn pause(&self, paused: bool) {
        lock_core(&self.core).pause(paused);
        if !paused {
            self.notify_enqueued();
        }
    }

    pub fn is_paused(&self) -> bool {
        lock_core(&self.core).is_paused()
    }

    /// Ids with a live cron timer (diagnostics and tests).
    pub fn active_timer_ids(&self) -> Vec<TaskId> {
        self.lock_timers().active_task_ids()
    }

    /// Begin graceful shutdown: stop timers and tell the engine to drain.
    pub async fn shutdown(&self) {
        self.lock_timers().shutdown();
        if self
            .events_tx
            .send(EngineEvent::ShutdownRequested)
            .await
            .is_err()
        {
            debug!("engine already stopped");
        }
    }

    // ---------------------------------------------------------------
    // Collection documents
    // ---------------------------------------------------------------

    /// Install a loaded collection document. Returns the created ids.
    pub fn load_collection_doc(&self, doc: CollectionDoc) -> Result<Vec<TaskId>> {
        let created = lock_core(&self.core).registry_mut().apply_collection_doc(doc)?;
        for id in &created {
            self.emit(Notice::TaskNew(id.clone()));
        }
        self.sync_timers();
        Ok(created)
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn sync_timers(&self) {
        let desired = lock_core(&self.core).registry().active_timer_specs();
        self.lock_timers().sync(desired);
    }

    fn lock_timers(&self) -> std::sync::MutexGuard<'_, TimerSet> {
        self.timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, notice: Notice) {
        // No receivers is fine; notifications are best-effort.
        let _ = self.notices.send(notice);
    }

    /// Wake the engine for an admission check. The poll interval covers
    /// the rare case of a briefly-full event channel.
    fn notify_enqueued(&self) {
        if let Err(err) = self.events_tx.try_send(EngineEvent::RunEnqueued) {
            warn!(%err, "could not notify engine of new run");
        }
    }
}

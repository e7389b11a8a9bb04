// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::core::{SharedCore, lock_core};
use crate::engine::{EngineEvent, EngineOptions, Notice};
use crate::errors::Result;
use crate::exec::WorkerBackend;

/// The async shell around [`crate::engine::EngineCore`].
///
/// Consumes [`EngineEvent`]s from timers, workers and the scheduler
/// handle, plus a fixed poll interval as a safety net against missed
/// events, and dispatches admitted runs to a [`WorkerBackend`].
pub struct Engine<B: WorkerBackend> {
    core: SharedCore,
    events_rx: mpsc::Receiver<EngineEvent>,
    backend: B,
    notices: broadcast::Sender<Notice>,
    poll_interval: Duration,
    exit_when_idle: bool,
    /// Set once shutdown is requested: no more admissions, just draining.
    draining: bool,
}

impl<B: WorkerBackend> fmt::Debug for Engine<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("poll_interval", &self.poll_interval)
            .field("draining", &self.draining)
            .finish_non_exhaustive()
    }
}

impl<B: WorkerBackend> Engine<B> {
    pub fn new(
        core: SharedCore,
        events_rx: mpsc::Receiver<EngineEvent>,
        backend: B,
        notices: broadcast::Sender<Notice>,
        options: &EngineOptions,
    ) -> Self {
        Self {
            core,
            events_rx,
            backend,
            notices,
            poll_interval: options.poll_interval,
            exit_when_idle: options.exit_when_idle,
            draining: false,
        }
    }

    /// Main scheduler loop. Runs until shutdown completes (all workers
    /// drained) or, with `exit_when_idle`, until nothing is left to do.
    pub async fn run(mut self) -> Result<()> {
        info!("crondag engine started");

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if self.draining {
                        let remaining = lock_core(&self.core).worker_count();
                        if remaining == 0 {
                            break;
                        }
                        info!(remaining, "waiting for workers to finish");
                    } else {
                        self.admit_ready().await?;
                    }
                }
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => {
                            debug!(?event, "engine received event");
                            if !self.handle_event(event).await? {
                                break;
                            }
                        }
                        None => {
                            info!("engine event channel closed; exiting");
                            break;
                        }
                    }
                }
            }
        }

        info!("engine exiting");
        Ok(())
    }

    /// Handle one event; returns false when the loop should stop.
    async fn handle_event(&mut self, event: EngineEvent) -> Result<bool> {
        match event {
            EngineEvent::TimerFired { task } => {
                let pushed = lock_core(&self.core).handle_timer_fired(&task);
                match pushed {
                    Ok(Some(run)) => {
                        self.emit(Notice::QueueNew(run));
                        self.admit_ready().await?;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(task = %task, %err, "timer tick could not queue a run");
                    }
                }
            }
            EngineEvent::RunEnqueued | EngineEvent::Poll => {
                self.admit_ready().await?;
            }
            EngineEvent::WorkerStarted { run, pid } => {
                lock_core(&self.core).handle_worker_started(&run, pid);
            }
            EngineEvent::WorkerCompleted { run, exit_code } => {
                let outcome = lock_core(&self.core).handle_worker_completed(&run, exit_code);

                if let Some(outcome) = outcome {
                    info!(
                        run = %outcome.run.id,
                        task = outcome.run.task_id().unwrap_or("<adhoc>"),
                        exit_code,
                        duration_ms = outcome.run.duration_ms(),
                        "worker completed"
                    );
                    self.emit(Notice::WorkerComplete(outcome.run));
                    for triggered in outcome.triggered {
                        self.emit(Notice::QueueNew(triggered));
                    }
                }

                // Backfill the freed slot immediately.
                self.admit_ready().await?;

                let core = lock_core(&self.core);
                if self.draining && core.worker_count() == 0 {
                    return Ok(false);
                }
                if self.exit_when_idle && !self.draining && core.is_idle() {
                    info!("nothing queued or running; exiting");
                    return Ok(false);
                }
            }
            EngineEvent::ShutdownRequested => {
                info!("shutdown requested; pausing admissions and signalling workers");
                lock_core(&self.core).pause(true);
                self.draining = true;
                self.backend.signal_all().await?;
                if lock_core(&self.core).worker_count() == 0 {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Admit eligible runs while capacity allows, handing each to the
    /// backend.
    async fn admit_ready(&mut self) -> Result<()> {
        loop {
            let admitted = lock_core(&self.core).next_admission();
            let Some(run) = admitted else {
                break;
            };

            info!(
                run = %run.id,
                task = run.task_id().unwrap_or("<adhoc>"),
                triggered_by = run.triggered_by.label(),
                "starting worker"
            );

            self.emit(Notice::QueueShifted(run.clone()));
            self.emit(Notice::WorkerStart(run.clone()));
            self.backend.spawn_worker(run).await?;
        }
        Ok(())
    }

    fn emit(&self, notice: Notice) {
        // No receivers is fine; notifications are best-effort.
        let _ = self.notices.send(notice);
    }
}

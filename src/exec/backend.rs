// src/exec/backend.rs

//! Pluggable worker backend abstraction.
//!
//! The engine talks to a `WorkerBackend` instead of spawning processes
//! itself. This keeps process handling swappable: `ProcessBackend` is the
//! production implementation, while tests provide a backend that records
//! which runs were dispatched and completes them without real processes.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, watch};

use crate::engine::EngineEvent;
use crate::errors::Result;
use crate::run::Run;

use super::worker::run_worker;

/// Trait abstracting how admitted runs are executed.
pub trait WorkerBackend: Send {
    /// Dispatch one run for execution. The implementation must eventually
    /// send `WorkerCompleted` for it (production spawns a process; tests
    /// may complete it immediately).
    fn spawn_worker(&mut self, run: Run) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Forward a termination signal to every in-flight worker (graceful
    /// shutdown).
    fn signal_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real worker backend: each run gets its own Tokio task driving one OS
/// process. A watch channel fans the shutdown signal out to all of them.
pub struct ProcessBackend {
    events_tx: mpsc::Sender<EngineEvent>,
    shutdown_tx: watch::Sender<bool>,
}

impl ProcessBackend {
    pub fn new(events_tx: mpsc::Sender<EngineEvent>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            events_tx,
            shutdown_tx,
        }
    }
}

impl WorkerBackend for ProcessBackend {
    fn spawn_worker(&mut self, run: Run) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let events_tx = self.events_tx.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        Box::pin(async move {
            tokio::spawn(run_worker(run, events_tx, shutdown_rx));
            Ok(())
        })
    }

    fn signal_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let _ = self.shutdown_tx.send(true);
            Ok(())
        })
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crondag::engine::EngineEvent;
use crondag::errors::Result;
use crondag::exec::WorkerBackend;
use crondag::run::Run;

/// A fake worker backend that:
/// - records which runs were dispatched (task id, or the command for
///   ad-hoc runs)
/// - immediately reports `WorkerStarted` and `WorkerCompleted`, with exit
///   code 0 unless one was registered via [`FakeBackend::set_exit_code`].
pub struct FakeBackend {
    events_tx: mpsc::Sender<EngineEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    exit_codes: Arc<Mutex<HashMap<String, i32>>>,
}

impl FakeBackend {
    pub fn new(events_tx: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            events_tx,
            executed: Arc::new(Mutex::new(Vec::new())),
            exit_codes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Shared handle to the list of dispatched task labels, in order.
    pub fn executed(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }

    /// Make future runs of `task_id` complete with `exit_code`.
    pub fn set_exit_code(&self, task_id: &str, exit_code: i32) {
        self.exit_codes
            .lock()
            .unwrap()
            .insert(task_id.to_string(), exit_code);
    }
}

impl WorkerBackend for FakeBackend {
    fn spawn_worker(&mut self, run: Run) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let events_tx = self.events_tx.clone();
        let executed = Arc::clone(&self.executed);
        let exit_codes = Arc::clone(&self.exit_codes);

        Box::pin(async move {
            let label = run
                .task_id()
                .unwrap_or(run.task.command.as_str())
                .to_string();
            executed.lock().unwrap().push(label);

            let exit_code = run
                .task_id()
                .and_then(|id| exit_codes.lock().unwrap().get(id).copied())
                .unwrap_or(0);

            events_tx
                .send(EngineEvent::WorkerStarted {
                    run: run.id.clone(),
                    pid: 4242,
                })
                .await
                .map_err(anyhow::Error::from)?;

            events_tx
                .send(EngineEvent::WorkerCompleted {
                    run: run.id,
                    exit_code,
                })
                .await
                .map_err(anyhow::Error::from)?;

            Ok(())
        })
    }

    fn signal_all(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { Ok(()) })
    }
}

// src/exec/worker.rs

//! Individual worker: one OS process for one run.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::engine::EngineEvent;
use crate::run::Run;

/// Exit code reported when a process could not be spawned or was killed
/// before exiting on its own.
const SPAWN_FAILURE_CODE: i32 = -1;

/// Execute one run's command, reporting `WorkerStarted` and
/// `WorkerCompleted` back to the engine.
///
/// Failures here (missing working directory, unspawnable command) become a
/// completed run with exit code -1; they drive the failure-dependency path
/// and never surface as engine errors.
pub async fn run_worker(
    run: Run,
    events_tx: mpsc::Sender<EngineEvent>,
    shutdown_rx: watch::Receiver<bool>,
) {
    let run_id = run.id.clone();
    let task = run.task_id().unwrap_or("<adhoc>").to_string();

    if let Err(err) = run_worker_inner(run, &events_tx, shutdown_rx).await {
        error!(run = %run_id, task = %task, error = %err, "worker failed");
        let _ = events_tx
            .send(EngineEvent::WorkerCompleted {
                run: run_id,
                exit_code: SPAWN_FAILURE_CODE,
            })
            .await;
    }
}

async fn run_worker_inner(
    run: Run,
    events_tx: &mpsc::Sender<EngineEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let task = run.task_id().unwrap_or("<adhoc>").to_string();

    info!(run = %run.id, task = %task, cmd = %run.task.command, "worker starting process");

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&run.task.command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&run.task.command);
        c
    };

    if let Some(cwd) = &run.task.cwd {
        cmd.current_dir(cwd);
    }
    cmd.envs(&run.task.env);

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for run '{}'", run.id))?;

    if let Some(pid) = child.id() {
        events_tx
            .send(EngineEvent::WorkerStarted {
                run: run.id.clone(),
                pid,
            })
            .await
            .context("reporting worker start to engine")?;
    }

    if let Some(stdout) = child.stdout.take() {
        let task = task.clone();
        let run_id = run.id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task, run = %run_id, "stdout: {line}");
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let task = task.clone();
        let run_id = run.id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(task = %task, run = %run_id, "stderr: {line}");
            }
        });
    }

    // Either the process exits on its own, or shutdown is signalled and we
    // kill it; the kill path still waits and reports the exit so the
    // engine's worker map drains.
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        changed = shutdown_rx.changed() => {
            match changed {
                Ok(()) if *shutdown_rx.borrow() => None,
                _ => Some(child.wait().await),
            }
        }
    };

    let status = match exited {
        Some(status) => {
            status.with_context(|| format!("waiting for process of run '{}'", run.id))?
        }
        None => {
            info!(run = %run.id, task = %task, "shutdown signalled; killing process");
            if let Err(err) = child.kill().await {
                warn!(run = %run.id, error = %err, "failed to kill child process");
            }
            child
                .wait()
                .await
                .with_context(|| format!("waiting for killed process of run '{}'", run.id))?
        }
    };

    let exit_code = status.code().unwrap_or(SPAWN_FAILURE_CODE);
    info!(
        run = %run.id,
        task = %task,
        exit_code,
        success = status.success(),
        "worker process exited"
    );

    events_tx
        .send(EngineEvent::WorkerCompleted {
            run: run.id.clone(),
            exit_code,
        })
        .await
        .context("reporting worker completion to engine")?;

    Ok(())
}

// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod queue;
pub mod registry;
pub mod run;
pub mod scheduler;
pub mod store;
pub mod timer;

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::load_settings_or_default;
use crate::config::model::Settings;
use crate::engine::EngineOptions;
use crate::registry::TaskRegistry;
use crate::registry::task::{TaskStatus, Trigger};
use crate::scheduler::Scheduler;
use crate::store::{CollectionStore, spawn_autosave};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings loading
/// - scheduler handle + engine loop + process backend
/// - collection document load and autosave
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = load_settings_or_default(&args.config)?;

    if args.dry_run {
        print_dry_run(&settings)?;
        return Ok(());
    }

    let options = EngineOptions {
        max_workers: settings.config.effective_max_workers(),
        poll_interval: Duration::from_millis(settings.config.poll_interval_ms.max(1)),
        start_paused: settings.config.pause || args.paused,
        exit_when_idle: false,
    };
    info!(
        max_workers = options.max_workers,
        paused = options.start_paused,
        "starting scheduler"
    );

    let (scheduler, engine) = Scheduler::with_options(&settings, options);

    // Load persisted collections first, then start saving on changes.
    if let Some(dir) = &settings.config.collections_dir {
        let store = CollectionStore::new(dir);
        let loaded = store.load_into(&scheduler)?;
        info!(tasks = loaded, dir = %dir, "collections loaded");
        spawn_autosave(scheduler.clone(), store);
    }

    // Ctrl-C → graceful shutdown: pause admissions, signal children, drain.
    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            scheduler.shutdown().await;
        });
    }

    engine.run().await?;
    Ok(())
}

/// Simple dry-run output: print tasks, triggers and dependency edges.
fn print_dry_run(settings: &Settings) -> Result<()> {
    let mut registry = TaskRegistry::new(
        settings.config.default_collection.clone(),
        settings.defaults.clone(),
    );

    if let Some(dir) = &settings.config.collections_dir {
        for doc in CollectionStore::new(dir).read_documents()? {
            registry.apply_collection_doc(doc)?;
        }
    }

    println!("crondag dry-run");
    println!(
        "  config.max_workers = {}",
        settings.config.effective_max_workers()
    );
    println!("  config.queue_size = {}", settings.config.queue_size);
    println!();

    let ids = registry.task_ids();
    println!("tasks ({}):", ids.len());
    for id in ids {
        let task = registry.resolved_task(&id)?;
        let suffix = if registry.is_task_enabled(&task) {
            ""
        } else {
            " (disabled)"
        };
        println!("  - {id}{suffix}");
        println!("      command: {}", task.command);
        if let Some(cwd) = &task.cwd {
            println!("      cwd: {cwd}");
        }
        match &task.trigger {
            Some(Trigger::Time(expr)) => println!("      time: {expr}"),
            Some(Trigger::After(pattern)) => println!("      after: {pattern}"),
            Some(Trigger::AfterFailed(pattern)) => println!("      afterFailed: {pattern}"),
            None => println!("      manual only"),
        }

        let deps = registry.dependencies(&id, TaskStatus::Success)?;
        if !deps.is_empty() {
            println!("      runs after: {deps:?}");
        }
        let failure_deps = registry.dependencies(&id, TaskStatus::Error)?;
        if !failure_deps.is_empty() {
            println!("      runs after failure of: {failure_deps:?}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

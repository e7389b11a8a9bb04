// tests/engine_core.rs

//! Admission and completion semantics, driven directly against the pure
//! core without a runtime.

mod common;
use crate::common::init_tracing;

use crondag::config::model::TaskDefaults;
use crondag::engine::{EngineCore, EngineOptions};
use crondag::registry::TaskRegistry;
use crondag::registry::task::TaskSnapshot;
use crondag::run::{Run, TriggeredBy};
use crondag_test_utils::builders::TaskConfigBuilder;

fn core_with(max_workers: usize) -> EngineCore {
    let registry = TaskRegistry::new("default", TaskDefaults::default());
    let options = EngineOptions {
        max_workers,
        ..Default::default()
    };
    EngineCore::new(registry, 16, &options)
}

#[test]
fn admission_respects_the_worker_cap() {
    init_tracing();

    let mut core = core_with(1);
    for name in ["a", "b"] {
        core.registry_mut()
            .create_task(TaskConfigBuilder::new(name, "echo x").build())
            .unwrap();
        core.enqueue_task(&format!("default.{name}"), TriggeredBy::Manual)
            .unwrap();
    }

    let first = core.next_admission().unwrap();
    assert_eq!(first.task_id(), Some("default.a"));
    assert!(first.started.is_some());
    assert_eq!(core.worker_count(), 1);
    // Status snapshot covers the in-flight run plus the queued one.
    assert_eq!(core.runs().len(), 2);

    // Cap reached: nothing more until the first worker completes.
    assert!(core.next_admission().is_none());

    core.handle_worker_completed(&first.id, 0).unwrap();
    assert_eq!(core.worker_count(), 0);

    let second = core.next_admission().unwrap();
    assert_eq!(second.task_id(), Some("default.b"));
}

#[test]
fn a_running_task_is_skipped_not_started_twice() {
    init_tracing();

    let mut core = core_with(4);
    for name in ["slow", "other"] {
        core.registry_mut()
            .create_task(TaskConfigBuilder::new(name, "echo x").build())
            .unwrap();
    }

    core.enqueue_task("default.slow", TriggeredBy::Timer).unwrap();
    let running = core.next_admission().unwrap();
    assert_eq!(running.task_id(), Some("default.slow"));

    // A dependency-triggered duplicate may wait in the queue while the
    // first run executes, but it is never admitted concurrently.
    let upstream = Run::new(TaskSnapshot::adhoc("echo up"), TriggeredBy::Manual);
    core.enqueue_task("default.slow", TriggeredBy::Run(Box::new(upstream)))
        .unwrap();
    core.enqueue_task("default.other", TriggeredBy::Timer).unwrap();

    let next = core.next_admission().unwrap();
    assert_eq!(next.task_id(), Some("default.other"));
    assert!(core.next_admission().is_none());
    assert_eq!(core.queue().len(), 1);

    // Once the first run finishes, the queued duplicate becomes eligible.
    core.handle_worker_completed(&running.id, 0).unwrap();
    let queued_duplicate = core.next_admission().unwrap();
    assert_eq!(queued_duplicate.task_id(), Some("default.slow"));
}

#[test]
fn completion_triggers_success_references() {
    init_tracing();

    let mut core = core_with(2);
    core.registry_mut()
        .create_task(TaskConfigBuilder::new("hello", "echo hello").build())
        .unwrap();
    core.registry_mut()
        .create_task(TaskConfigBuilder::new("goodbye", "echo goodbye").after("hello").build())
        .unwrap();

    core.enqueue_task("default.hello", TriggeredBy::Manual).unwrap();
    let hello = core.next_admission().unwrap();

    let outcome = core.handle_worker_completed(&hello.id, 0).unwrap();
    assert_eq!(outcome.run.exit_code, Some(0));
    assert!(outcome.run.completed.is_some());

    assert_eq!(outcome.triggered.len(), 1);
    let goodbye = &outcome.triggered[0];
    assert_eq!(goodbye.task_id(), Some("default.goodbye"));
    // The new run points back at the run that caused it.
    assert_eq!(
        goodbye.triggered_by.upstream().map(|r| r.id.as_str()),
        Some(hello.id.as_str())
    );
    assert_eq!(core.queue().len(), 1);

    let task = core.registry().get_task("default.hello").unwrap();
    assert_eq!(task.recent_exit_codes.back().copied(), Some(0));
    assert!(task.last_successful_run.is_some());
}

#[test]
fn failure_triggers_only_the_failure_tree() {
    init_tracing();

    let mut core = core_with(2);
    core.registry_mut()
        .create_task(TaskConfigBuilder::new("job", "exit 1").build())
        .unwrap();
    core.registry_mut()
        .create_task(TaskConfigBuilder::new("celebrate", "echo yay").after("job").build())
        .unwrap();
    core.registry_mut()
        .create_task(
            TaskConfigBuilder::new("cleanup", "echo oops")
                .after_failed("job")
                .build(),
        )
        .unwrap();

    core.enqueue_task("default.job", TriggeredBy::Manual).unwrap();
    let job = core.next_admission().unwrap();
    let outcome = core.handle_worker_completed(&job.id, 2).unwrap();

    let triggered: Vec<_> = outcome
        .triggered
        .iter()
        .filter_map(Run::task_id)
        .collect();
    assert_eq!(triggered, vec!["default.cleanup"]);

    let task = core.registry().get_task("default.job").unwrap();
    assert_eq!(task.recent_exit_codes.back().copied(), Some(2));
    assert!(task.last_successful_run.is_none());
}

#[test]
fn disabled_references_are_not_triggered() {
    init_tracing();

    let mut core = core_with(2);
    core.registry_mut()
        .create_task(TaskConfigBuilder::new("hello", "echo hello").build())
        .unwrap();
    core.registry_mut()
        .create_task(
            TaskConfigBuilder::new("goodbye", "echo goodbye")
                .after("hello")
                .disabled()
                .build(),
        )
        .unwrap();

    core.enqueue_task("default.hello", TriggeredBy::Manual).unwrap();
    let hello = core.next_admission().unwrap();
    let outcome = core.handle_worker_completed(&hello.id, 0).unwrap();

    assert!(outcome.triggered.is_empty());
    assert!(core.queue().is_empty());
}

#[test]
fn adhoc_runs_propagate_nothing() {
    init_tracing();

    let mut core = core_with(2);
    core.registry_mut()
        .create_task(TaskConfigBuilder::new("watcher", "echo w").after_failed("*").build())
        .unwrap();

    core.queue_mut()
        .push(Run::new(TaskSnapshot::adhoc("exit 1"), TriggeredBy::Manual))
        .unwrap();
    let adhoc = core.next_admission().unwrap();
    let outcome = core.handle_worker_completed(&adhoc.id, 1).unwrap();

    assert!(outcome.triggered.is_empty());
}

#[test]
fn pause_blocks_admissions_but_not_bookkeeping() {
    init_tracing();

    let mut core = core_with(2);
    core.registry_mut()
        .create_task(TaskConfigBuilder::new("job", "echo x").build())
        .unwrap();
    core.enqueue_task("default.job", TriggeredBy::Manual).unwrap();

    core.pause(true);
    assert!(!core.ready());
    assert!(core.next_admission().is_none());
    assert_eq!(core.queue().len(), 1);

    core.pause(false);
    assert!(core.ready());
    assert!(core.next_admission().is_some());
}

#[test]
fn timer_fires_for_missing_or_disabled_tasks_are_ignored() {
    init_tracing();

    let mut core = core_with(2);
    assert!(core.handle_timer_fired("default.ghost").unwrap().is_none());

    core.registry_mut()
        .create_task(TaskConfigBuilder::new("tick", "echo t").disabled().build())
        .unwrap();
    assert!(core.handle_timer_fired("default.tick").unwrap().is_none());
    assert!(core.queue().is_empty());

    core.registry_mut().set_task_enabled("default.tick", true).unwrap();
    assert!(core.handle_timer_fired("default.tick").unwrap().is_some());
    assert_eq!(core.queue().len(), 1);

    // A second tick while the first run still waits is absorbed by dedup.
    assert!(core.handle_timer_fired("default.tick").unwrap().is_none());
    assert_eq!(core.queue().len(), 1);
}

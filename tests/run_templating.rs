// tests/run_templating.rs

mod common;
use crate::common::init_tracing;

use std::collections::BTreeMap;

use crondag::registry::task::TaskSnapshot;
use crondag::run::{Run, TriggeredBy};

fn snapshot(task_id: &str, command: &str) -> TaskSnapshot {
    TaskSnapshot {
        id: Some(task_id.to_string()),
        command: command.to_string(),
        cwd: None,
        env: BTreeMap::new(),
    }
}

#[test]
fn plain_commands_are_untouched() {
    init_tracing();

    let run = Run::new(snapshot("c.t", "echo plain"), TriggeredBy::Manual);
    assert_eq!(run.task.command, "echo plain");
}

#[test]
fn a_run_can_reference_itself() {
    init_tracing();

    let run = Run::new(
        snapshot("c.t", "echo run {{run.id}} of {{run.task.id}}"),
        TriggeredBy::Timer,
    );
    assert_eq!(run.task.command, format!("echo run {} of c.t", run.id));
}

#[test]
fn a_dependent_run_can_report_its_upstream() {
    init_tracing();

    let mut upstream = Run::new(snapshot("c.flaky", "exit 3"), TriggeredBy::Timer);
    upstream.start();
    upstream.complete(3);

    let run = Run::new(
        snapshot(
            "c.notify",
            "notify --run {{run.triggeredBy.id}} --task {{run.triggeredBy.task.id}} --code {{run.triggeredBy.exitCode}}",
        ),
        TriggeredBy::Run(Box::new(upstream.clone())),
    );

    assert_eq!(
        run.task.command,
        format!("notify --run {} --task c.flaky --code 3", upstream.id)
    );
}

#[test]
fn unknown_markers_are_left_alone() {
    init_tracing();

    let run = Run::new(snapshot("c.t", "echo {{run.nonsense}}"), TriggeredBy::Manual);
    assert_eq!(run.task.command, "echo {{run.nonsense}}");
}

#[test]
fn lifecycle_stamps_are_ordered() {
    init_tracing();

    let mut run = Run::new(snapshot("c.t", "sleep 5"), TriggeredBy::Manual);
    assert!(run.started.is_none());
    assert!(run.completed.is_none());
    assert!(run.exit_code.is_none());
    assert!(run.duration_ms().is_none());

    run.start();
    assert!(run.started.is_some());

    run.complete(0);
    assert_eq!(run.exit_code, Some(0));
    assert!(run.completed.unwrap() >= run.started.unwrap());
    assert!(run.duration_ms().unwrap() >= 0);
}

// tests/queue_behaviour.rs

mod common;
use crate::common::init_tracing;

use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;

use crondag::errors::CrondagError;
use crondag::queue::RunQueue;
use crondag::registry::task::TaskSnapshot;
use crondag::run::{Run, TriggeredBy};

fn snapshot(task_id: &str) -> TaskSnapshot {
    TaskSnapshot {
        id: Some(task_id.to_string()),
        command: format!("echo {task_id}"),
        cwd: None,
        env: BTreeMap::new(),
    }
}

fn timer_run(task_id: &str) -> Run {
    Run::new(snapshot(task_id), TriggeredBy::Timer)
}

fn dependency_run(task_id: &str, upstream: &Run) -> Run {
    Run::new(
        snapshot(task_id),
        TriggeredBy::Run(Box::new(upstream.clone())),
    )
}

#[test]
fn queue_rejects_pushes_beyond_capacity() {
    init_tracing();

    let mut queue = RunQueue::new(3);
    for i in 0..3 {
        let pushed = queue.push(timer_run(&format!("c.t{i}"))).unwrap();
        assert!(pushed.is_enqueued());
    }

    let err = queue.push(timer_run("c.t3")).unwrap_err();
    assert!(matches!(err, CrondagError::QueueFull { capacity: 3 }));
    assert_eq!(queue.len(), 3);
}

#[test]
fn duplicate_timer_push_is_suppressed() {
    init_tracing();

    let mut queue = RunQueue::new(8);
    let first = queue.push(timer_run("c.slow")).unwrap();
    let second = queue.push(timer_run("c.slow")).unwrap();

    assert!(first.is_enqueued());
    assert!(!second.is_enqueued());
    // The suppressed push hands back the run that is already waiting.
    assert_eq!(second.run().id, first.run().id);
    assert_eq!(queue.len(), 1);
}

#[test]
fn dependency_push_bypasses_dedup() {
    init_tracing();

    let mut queue = RunQueue::new(8);
    let upstream = timer_run("c.upstream");
    queue.push(timer_run("c.slow")).unwrap();

    let pushed = queue.push(dependency_run("c.slow", &upstream)).unwrap();
    assert!(pushed.is_enqueued());
    assert_eq!(queue.len(), 2);
}

#[test]
fn adhoc_runs_are_never_suppressed() {
    init_tracing();

    let mut queue = RunQueue::new(8);
    queue
        .push(Run::new(TaskSnapshot::adhoc("echo hi"), TriggeredBy::Manual))
        .unwrap();
    let pushed = queue
        .push(Run::new(TaskSnapshot::adhoc("echo hi"), TriggeredBy::Manual))
        .unwrap();

    assert!(pushed.is_enqueued());
    assert_eq!(queue.len(), 2);
}

#[test]
fn get_next_skips_running_tasks() {
    init_tracing();

    let mut queue = RunQueue::new(8);
    queue.push(timer_run("c.a")).unwrap();
    queue.push(timer_run("c.b")).unwrap();

    let running: HashSet<String> = ["c.a".to_string()].into_iter().collect();
    let next = queue.get_next(&running).unwrap();
    assert_eq!(next.task_id(), Some("c.b"));

    // `c.a` stays queued for when it stops running.
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.present_task_ids(), vec!["c.a".to_string()]);

    // Everything running: nothing eligible, queue untouched.
    assert!(queue.get_next(&running).is_none());
    assert_eq!(queue.len(), 1);
}

#[test]
fn get_next_is_fifo() {
    init_tracing();

    let mut queue = RunQueue::new(8);
    for id in ["c.a", "c.b", "c.c"] {
        queue.push(timer_run(id)).unwrap();
    }

    let running = HashSet::new();
    let drained: Vec<String> = std::iter::from_fn(|| queue.get_next(&running))
        .filter_map(|run| run.task_id().map(str::to_string))
        .collect();

    assert_eq!(drained, vec!["c.a", "c.b", "c.c"]);
    assert!(queue.is_empty());
}

#[test]
fn clear_removes_one_task_or_everything() {
    init_tracing();

    let mut queue = RunQueue::new(8);
    let upstream = timer_run("c.upstream");
    queue.push(timer_run("c.a")).unwrap();
    queue.push(timer_run("c.b")).unwrap();
    queue.push(dependency_run("c.a", &upstream)).unwrap();

    assert_eq!(queue.clear(Some("c.a")), 2);
    assert_eq!(queue.present_task_ids(), vec!["c.b".to_string()]);

    assert_eq!(queue.clear(None), 1);
    assert!(queue.is_empty());
}

proptest! {
    // FIFO modulo skip: draining with a fixed running set yields exactly
    // the eligible runs, in arrival order, and leaves the rest queued.
    #[test]
    fn drain_preserves_arrival_order(
        count in 1usize..20,
        running_mask in proptest::collection::vec(any::<bool>(), 20),
    ) {
        let mut queue = RunQueue::new(64);
        let mut running = HashSet::new();
        let mut expected = Vec::new();

        for i in 0..count {
            let id = format!("c.t{i}");
            queue.push(timer_run(&id)).unwrap();
            if running_mask[i] {
                running.insert(id);
            } else {
                expected.push(id);
            }
        }

        let mut drained = Vec::new();
        while let Some(run) = queue.get_next(&running) {
            drained.push(run.task_id().unwrap().to_string());
        }

        prop_assert_eq!(drained, expected);
        prop_assert_eq!(queue.len(), running.len());
    }
}

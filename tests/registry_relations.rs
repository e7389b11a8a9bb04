// tests/registry_relations.rs

mod common;
use crate::common::init_tracing;

use chrono::Utc;

use crondag::config::model::TaskDefaults;
use crondag::errors::CrondagError;
use crondag::registry::TaskRegistry;
use crondag::registry::task::{TaskStatus, Trigger};
use crondag_test_utils::builders::TaskConfigBuilder;

fn registry() -> TaskRegistry {
    TaskRegistry::new("default", TaskDefaults::default())
}

#[test]
fn create_then_get_round_trips() {
    init_tracing();

    let mut registry = registry();
    let created = registry
        .create_task(
            TaskConfigBuilder::new("sleep", "sleep 5")
                .collection("website")
                .cwd("/var/www")
                .env("STAGE", "prod")
                .trigger("*/10 * * * *")
                .build(),
        )
        .unwrap();

    assert_eq!(created.id, "website.sleep");

    let fetched = registry.resolved_task("website.sleep").unwrap();
    assert_eq!(fetched.name, "sleep");
    assert_eq!(fetched.collection, "website");
    assert_eq!(fetched.command, "sleep 5");
    assert_eq!(fetched.cwd.as_deref(), Some("/var/www"));
    assert_eq!(fetched.env.get("STAGE").map(String::as_str), Some("prod"));
    assert_eq!(
        fetched.trigger,
        Some(Trigger::Time("*/10 * * * *".to_string()))
    );
    assert!(fetched.enabled);
}

#[test]
fn duplicate_ids_are_rejected_but_recreate_after_delete_works() {
    init_tracing();

    let mut registry = registry();
    registry
        .create_task(TaskConfigBuilder::new("once", "echo 1").build())
        .unwrap();

    let err = registry
        .create_task(TaskConfigBuilder::new("once", "echo 2").build())
        .unwrap_err();
    assert!(matches!(err, CrondagError::DuplicateTask(id) if id == "default.once"));

    registry.delete_task("default.once").unwrap();
    registry
        .create_task(TaskConfigBuilder::new("once", "echo 3").build())
        .unwrap();
    assert_eq!(
        registry.get_task("default.once").unwrap().command,
        "echo 3"
    );
}

#[test]
fn unknown_tasks_report_not_found() {
    init_tracing();

    let mut registry = registry();
    assert!(matches!(
        registry.get_task("nope.nothing"),
        Err(CrondagError::NotFound(_))
    ));
    assert!(matches!(
        registry.update_task("nope.nothing", Default::default()),
        Err(CrondagError::NotFound(_))
    ));
    assert!(matches!(
        registry.delete_task("nope.nothing"),
        Err(CrondagError::NotFound(_))
    ));
}

#[test]
fn bare_string_triggers_are_sniffed_into_time_or_after() {
    init_tracing();

    let mut registry = registry();
    registry
        .create_task(
            TaskConfigBuilder::new("everyminute", "echo hello")
                .trigger("* 5 * * *")
                .build(),
        )
        .unwrap();
    registry
        .create_task(
            TaskConfigBuilder::new("aftereveryminute", "echo hello")
                .trigger("everyminute")
                .build(),
        )
        .unwrap();

    assert_eq!(
        registry.get_task("default.everyminute").unwrap().trigger,
        Some(Trigger::Time("* 5 * * *".to_string()))
    );
    assert_eq!(
        registry
            .get_task("default.aftereveryminute")
            .unwrap()
            .trigger,
        Some(Trigger::After("default.everyminute".to_string()))
    );
    assert_eq!(
        registry.references("default.everyminute", TaskStatus::Success),
        vec!["default.aftereveryminute".to_string()]
    );
}

#[test]
fn bare_names_prefer_the_same_collection() {
    init_tracing();

    let mut registry = registry();
    registry
        .create_task(
            TaskConfigBuilder::new("build", "make")
                .collection("jobs")
                .build(),
        )
        .unwrap();
    registry
        .create_task(
            TaskConfigBuilder::new("test", "make test")
                .collection("jobs")
                .after("build")
                .build(),
        )
        .unwrap();
    // No jobs.deploy exists, so a bare "deploy" falls back to default.
    registry
        .create_task(
            TaskConfigBuilder::new("announce", "echo done")
                .collection("jobs")
                .after("deploy")
                .build(),
        )
        .unwrap();

    assert_eq!(
        registry.get_task("jobs.test").unwrap().trigger,
        Some(Trigger::After("jobs.build".to_string()))
    );
    assert_eq!(
        registry.get_task("jobs.announce").unwrap().trigger,
        Some(Trigger::After("default.deploy".to_string()))
    );
}

#[test]
fn wildcard_references_track_live_registry_contents() {
    init_tracing();

    let mut registry = registry();
    for (collection, name) in [("important", "one"), ("important", "two"), ("notimportant", "one")]
    {
        registry
            .create_task(
                TaskConfigBuilder::new(name, "echo x")
                    .collection(collection)
                    .build(),
            )
            .unwrap();
    }
    registry
        .create_task(
            TaskConfigBuilder::new("important", "echo cleanup")
                .collection("cleanup")
                .trigger("important.*")
                .build(),
        )
        .unwrap();
    registry
        .create_task(
            TaskConfigBuilder::new("all", "echo cleanup")
                .collection("cleanup")
                .trigger("*")
                .build(),
        )
        .unwrap();

    let mut refs = registry.references("important.one", TaskStatus::Success);
    refs.sort();
    assert_eq!(refs, vec!["cleanup.all", "cleanup.important"]);

    let mut deps = registry
        .dependencies("cleanup.all", TaskStatus::Success)
        .unwrap();
    deps.sort();
    assert_eq!(
        deps,
        vec![
            "cleanup.important",
            "important.one",
            "important.two",
            "notimportant.one"
        ]
    );

    // A task created after the wildcard trigger becomes visible without
    // re-registration.
    registry
        .create_task(
            TaskConfigBuilder::new("three", "echo x")
                .collection("important")
                .build(),
        )
        .unwrap();

    let refs = registry.references("important.three", TaskStatus::Success);
    assert!(refs.contains(&"cleanup.important".to_string()));
    assert!(
        registry
            .dependencies("cleanup.important", TaskStatus::Success)
            .unwrap()
            .contains(&"important.three".to_string())
    );

    // Deleting a task makes it drop out of the derived relation.
    registry.delete_task("important.three").unwrap();
    assert!(
        !registry
            .dependencies("cleanup.important", TaskStatus::Success)
            .unwrap()
            .contains(&"important.three".to_string())
    );
}

#[test]
fn failure_tree_routes_to_after_failed_tasks_but_never_self() {
    init_tracing();

    let mut registry = registry();
    registry
        .create_task(TaskConfigBuilder::new("goodbye", "exit 1").build())
        .unwrap();
    registry
        .create_task(
            TaskConfigBuilder::new("onerrors", "echo adios")
                .after_failed("*")
                .build(),
        )
        .unwrap();

    assert_eq!(
        registry.references("default.goodbye", TaskStatus::Error),
        vec!["default.onerrors".to_string()]
    );
    // Success completions never route into the failure tree.
    assert!(
        registry
            .references("default.goodbye", TaskStatus::Success)
            .is_empty()
    );
    // The wildcard never matches its own task.
    assert!(
        registry
            .references("default.onerrors", TaskStatus::Error)
            .is_empty()
    );
}

#[test]
fn update_merges_only_provided_fields_and_rewires_triggers() {
    init_tracing();

    let mut registry = registry();
    registry
        .create_task(
            TaskConfigBuilder::new("job", "echo v1")
                .trigger("0 2 * * *")
                .cwd("/tmp")
                .build(),
        )
        .unwrap();
    registry
        .create_task(TaskConfigBuilder::new("other", "echo other").build())
        .unwrap();

    let updated = registry
        .update_task(
            "default.job",
            TaskConfigBuilder::new("job", "echo v2").after("other").build(),
        )
        .unwrap();

    assert_eq!(updated.command, "echo v2");
    // Untouched fields survive.
    assert_eq!(updated.cwd.as_deref(), Some("/tmp"));
    // The time trigger was replaced by a dependency trigger.
    assert_eq!(
        updated.trigger,
        Some(Trigger::After("default.other".to_string()))
    );
    assert!(registry.active_timer_specs().is_empty());
}

#[test]
fn exit_code_ring_is_bounded_and_tracks_last_success() {
    init_tracing();

    let mut registry = registry();
    registry
        .create_task(TaskConfigBuilder::new("flaky", "maybe").build())
        .unwrap();

    for code in 0..12 {
        registry.record_task_exit("default.flaky", code, Utc::now());
    }

    let task = registry.get_task("default.flaky").unwrap();
    assert_eq!(task.recent_exit_codes.len(), 10);
    // Oldest entries (0 and 1) were evicted.
    assert_eq!(task.recent_exit_codes.front().copied(), Some(2));
    assert_eq!(task.recent_exit_codes.back().copied(), Some(11));
    assert!(task.last_successful_run.is_some());
}

#[test]
fn enablement_cascades_through_collections() {
    init_tracing();

    let mut registry = registry();
    registry
        .create_task(
            TaskConfigBuilder::new("a", "echo a")
                .collection("night")
                .time("0 3 * * *")
                .build(),
        )
        .unwrap();
    registry
        .create_task(
            TaskConfigBuilder::new("b", "echo b")
                .collection("night")
                .time("0 4 * * *")
                .disabled()
                .build(),
        )
        .unwrap();

    assert_eq!(
        registry.active_timer_specs(),
        vec![("night.a".to_string(), "0 3 * * *".to_string())]
    );

    // Disabling the collection silences the enabled member only; `b` was
    // already inert.
    let changed = registry.set_collection_enabled("night", false).unwrap();
    assert_eq!(changed, vec!["night.a".to_string()]);
    assert!(registry.active_timer_specs().is_empty());

    // Members keep their definitions and their own flags.
    assert!(registry.get_task("night.a").unwrap().enabled);
    assert!(!registry.get_task("night.b").unwrap().enabled);

    let changed = registry.set_collection_enabled("night", true).unwrap();
    assert_eq!(changed, vec!["night.a".to_string()]);
    assert_eq!(
        registry.active_timer_specs(),
        vec![("night.a".to_string(), "0 3 * * *".to_string())]
    );
}

#[test]
fn defaults_cascade_three_levels() {
    init_tracing();

    let global = TaskDefaults {
        cwd: Some("/global".to_string()),
        env: [("LEVEL".to_string(), "global".to_string()),
              ("GLOBAL_ONLY".to_string(), "yes".to_string())]
            .into_iter()
            .collect(),
    };
    let mut registry = TaskRegistry::new("default", global);

    registry
        .create_task(
            TaskConfigBuilder::new("plain", "echo plain")
                .env("LEVEL", "task")
                .build(),
        )
        .unwrap();

    let snapshot = registry.snapshot("default.plain").unwrap();
    assert_eq!(snapshot.cwd.as_deref(), Some("/global"));
    assert_eq!(snapshot.env.get("LEVEL").map(String::as_str), Some("task"));
    assert_eq!(
        snapshot.env.get("GLOBAL_ONLY").map(String::as_str),
        Some("yes")
    );
}

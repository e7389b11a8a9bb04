// src/registry/mod.rs

//! Task registry and derived dependency resolution.
//!
//! The registry owns all task definitions, per-collection defaults and the
//! collection enable switches. Dependency relationships are not stored:
//! [`TaskRegistry::references`] and [`TaskRegistry::dependencies`] scan the
//! live task map on every call, so wildcard triggers automatically see
//! tasks created after the trigger was set up.

pub mod relations;
pub mod task;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, info, warn};

use crate::config::model::{CollectionConfig, CollectionDoc, TaskDefaults, TaskDoc, TriggerSpec};
use crate::errors::{CrondagError, Result};
use crate::timer::cron;

use relations::pattern_matches;
use task::{merge_defaults, Task, TaskConfig, TaskId, TaskSnapshot, TaskStatus, Trigger};

#[derive(Debug)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskId, Task>,
    /// Per-collection defaults merged into member tasks.
    defaults: BTreeMap<String, TaskDefaults>,
    /// Per-collection switches; collections spring into existence with
    /// their first task and default to enabled.
    collections: BTreeMap<String, CollectionConfig>,
    global_defaults: TaskDefaults,
    default_collection: String,
}

impl TaskRegistry {
    pub fn new(default_collection: impl Into<String>, global_defaults: TaskDefaults) -> Self {
        Self {
            tasks: BTreeMap::new(),
            defaults: BTreeMap::new(),
            collections: BTreeMap::new(),
            global_defaults,
            default_collection: default_collection.into(),
        }
    }

    pub fn default_collection(&self) -> &str {
        &self.default_collection
    }

    // ---------------------------------------------------------------
    // Task lifecycle
    // ---------------------------------------------------------------

    /// Register a new task. Requires `name` and `command`; the collection
    /// defaults to the configured default collection.
    pub fn create_task(&mut self, config: TaskConfig) -> Result<Task> {
        let command = config
            .command
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CrondagError::Config("a task needs a command".to_string()))?;
        let name = config.name.filter(|n| !n.is_empty()).ok_or_else(|| {
            CrondagError::Config(format!("no name provided for task running '{command}'"))
        })?;
        let collection = config
            .collection
            .unwrap_or_else(|| self.default_collection.clone());
        let id = format!("{collection}.{name}");

        if self.tasks.contains_key(&id) {
            return Err(CrondagError::DuplicateTask(id));
        }

        info!(task = %id, "creating task");

        self.collections.entry(collection.clone()).or_default();

        let trigger = config
            .trigger
            .and_then(|spec| self.normalize_trigger(&spec, &collection));

        let task = Task {
            id: id.clone(),
            name,
            collection,
            command,
            cwd: config.cwd,
            env: config.env.unwrap_or_default(),
            trigger,
            enabled: config.enabled.unwrap_or(true),
            recent_exit_codes: VecDeque::new(),
            last_successful_run: None,
        };

        self.tasks.insert(id, task.clone());
        Ok(task)
    }

    /// Merge the provided fields into an existing task. The id (and thus
    /// name and collection) is immutable.
    pub fn update_task(&mut self, id: &str, config: TaskConfig) -> Result<Task> {
        let collection = self
            .tasks
            .get(id)
            .ok_or_else(|| CrondagError::NotFound(id.to_string()))?
            .collection
            .clone();

        if config.name.is_some() || config.collection.is_some() {
            warn!(task = %id, "task ids are immutable; ignoring name/collection in update");
        }

        let new_trigger = config
            .trigger
            .map(|spec| self.normalize_trigger(&spec, &collection));

        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| CrondagError::NotFound(id.to_string()))?;

        if let Some(command) = config.command {
            task.command = command;
        }
        if let Some(cwd) = config.cwd {
            task.cwd = Some(cwd);
        }
        if let Some(env) = config.env {
            task.env = env;
        }
        if let Some(enabled) = config.enabled {
            task.enabled = enabled;
        }
        if let Some(trigger) = new_trigger {
            task.trigger = trigger;
        }

        Ok(task.clone())
    }

    /// Remove a task. Other tasks' triggers that named it simply stop
    /// matching it in relationship scans.
    pub fn delete_task(&mut self, id: &str) -> Result<Task> {
        self.tasks
            .remove(id)
            .ok_or_else(|| CrondagError::NotFound(id.to_string()))
    }

    /// Delete a collection and every task in it. Returns the removed ids.
    pub fn delete_collection(&mut self, name: &str) -> Result<Vec<TaskId>> {
        let removed: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.collection == name)
            .map(|t| t.id.clone())
            .collect();

        if removed.is_empty() && !self.collections.contains_key(name) {
            return Err(CrondagError::NotFound(name.to_string()));
        }

        for id in &removed {
            self.tasks.remove(id);
        }
        self.collections.remove(name);
        self.defaults.remove(name);

        info!(collection = %name, tasks = removed.len(), "deleted collection");
        Ok(removed)
    }

    // ---------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------

    pub fn get_task(&self, id: &str) -> Result<&Task> {
        self.tasks
            .get(id)
            .ok_or_else(|| CrondagError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Task with the defaults cascade applied to `cwd`/`env`.
    pub fn resolved_task(&self, id: &str) -> Result<Task> {
        let task = self.get_task(id)?;
        let snapshot = self.snapshot_of(task);
        let mut resolved = task.clone();
        resolved.cwd = snapshot.cwd;
        resolved.env = snapshot.env;
        Ok(resolved)
    }

    /// Frozen, defaults-merged snapshot for a new run.
    pub fn snapshot(&self, id: &str) -> Result<TaskSnapshot> {
        let task = self.get_task(id)?;
        Ok(self.snapshot_of(task))
    }

    fn snapshot_of(&self, task: &Task) -> TaskSnapshot {
        let collection_defaults = self
            .defaults
            .get(&task.collection)
            .cloned()
            .unwrap_or_default();
        merge_defaults(task, &collection_defaults, &self.global_defaults)
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.keys().cloned().collect()
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.collections.keys().cloned().collect();
        names.extend(self.defaults.keys().cloned());
        names.extend(self.tasks.values().map(|t| t.collection.clone()));
        names.into_iter().collect()
    }

    /// Resolve a possibly-bare task name into a registered id.
    ///
    /// Qualified names are looked up verbatim. Bare names prefer the
    /// context collection, then fall back to the default collection.
    pub fn find_task_id(&self, name: &str, context_collection: Option<&str>) -> Option<TaskId> {
        if name.contains('.') {
            return self.tasks.contains_key(name).then(|| name.to_string());
        }

        if let Some(collection) = context_collection {
            let candidate = format!("{collection}.{name}");
            if self.tasks.contains_key(&candidate) {
                return Some(candidate);
            }
        }

        let candidate = format!("{}.{}", self.default_collection, name);
        self.tasks.contains_key(&candidate).then_some(candidate)
    }

    // ---------------------------------------------------------------
    // Enablement
    // ---------------------------------------------------------------

    /// Effective enablement: the task's own flag and its collection's.
    pub fn is_task_enabled(&self, task: &Task) -> bool {
        task.enabled
            && self
                .collections
                .get(&task.collection)
                .map(|c| c.enabled)
                .unwrap_or(true)
    }

    /// Flip one task's flag. Returns the ids whose live triggers changed
    /// (the task itself, if the flip changed its effective enablement and
    /// it has a trigger).
    pub fn set_task_enabled(&mut self, id: &str, enabled: bool) -> Result<Vec<TaskId>> {
        let collection_enabled = {
            let task = self.get_task(id)?;
            self.collections
                .get(&task.collection)
                .map(|c| c.enabled)
                .unwrap_or(true)
        };

        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| CrondagError::NotFound(id.to_string()))?;

        let was_live = task.enabled && collection_enabled;
        task.enabled = enabled;
        let is_live = task.enabled && collection_enabled;

        if was_live != is_live && task.trigger.is_some() {
            Ok(vec![task.id.clone()])
        } else {
            Ok(Vec::new())
        }
    }

    /// Flip a whole collection. Returns the member ids whose live triggers
    /// changed: members that are themselves enabled and have a trigger.
    /// Members individually disabled stay inert either way.
    pub fn set_collection_enabled(&mut self, name: &str, enabled: bool) -> Result<Vec<TaskId>> {
        let config = self
            .collections
            .get_mut(name)
            .ok_or_else(|| CrondagError::NotFound(name.to_string()))?;

        if config.enabled == enabled {
            return Ok(Vec::new());
        }
        config.enabled = enabled;

        Ok(self
            .tasks
            .values()
            .filter(|t| t.collection == name && t.enabled && t.trigger.is_some())
            .map(|t| t.id.clone())
            .collect())
    }

    /// Record a completed run's exit code on its task. Returns false if
    /// the task was deleted while the run was in flight.
    pub fn record_task_exit(
        &mut self,
        id: &str,
        code: i32,
        completed: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        match self.tasks.get_mut(id) {
            Some(task) => {
                task.record_exit(code, completed);
                true
            }
            None => false,
        }
    }

    // ---------------------------------------------------------------
    // Derived relationships
    // ---------------------------------------------------------------

    /// Tasks whose trigger (for `status`) expands to include `id`.
    ///
    /// These are the tasks to enqueue when `id` completes with `status`.
    pub fn references(&self, id: &str, status: TaskStatus) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| {
                t.trigger
                    .as_ref()
                    .and_then(|trigger| trigger.reference(status))
                    .map(|pattern| pattern_matches(pattern, id, &t.id))
                    .unwrap_or(false)
            })
            .map(|t| t.id.clone())
            .collect()
    }

    /// The inverse: the tasks `id`'s own trigger pattern expands to.
    pub fn dependencies(&self, id: &str, status: TaskStatus) -> Result<Vec<TaskId>> {
        let task = self.get_task(id)?;
        let Some(pattern) = task.trigger.as_ref().and_then(|t| t.reference(status)) else {
            return Ok(Vec::new());
        };

        Ok(self
            .tasks
            .keys()
            .filter(|candidate| pattern_matches(pattern, candidate.as_str(), id))
            .cloned()
            .collect())
    }

    // ---------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------

    /// Desired cron timers: one per effectively-enabled task with a timed
    /// trigger. The timer set is re-synced against this after every
    /// registry mutation.
    pub fn active_timer_specs(&self) -> Vec<(TaskId, String)> {
        self.tasks
            .values()
            .filter(|t| self.is_task_enabled(t))
            .filter_map(|t| {
                t.trigger
                    .as_ref()
                    .and_then(Trigger::time)
                    .map(|expr| (t.id.clone(), expr.to_string()))
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // Trigger normalization
    // ---------------------------------------------------------------

    fn normalize_trigger(&self, spec: &TriggerSpec, collection: &str) -> Option<Trigger> {
        match spec {
            TriggerSpec::Shorthand(s) => {
                if cron::is_cron_expression(s) {
                    Some(Trigger::Time(s.clone()))
                } else {
                    Some(Trigger::After(self.qualify_pattern(s, collection)))
                }
            }
            TriggerSpec::Fields {
                time: Some(expr), ..
            } => Some(Trigger::Time(expr.clone())),
            TriggerSpec::Fields {
                after: Some(pattern),
                ..
            } => Some(Trigger::After(self.qualify_pattern(pattern, collection))),
            TriggerSpec::Fields {
                after_failed: Some(pattern),
                ..
            } => Some(Trigger::AfterFailed(
                self.qualify_pattern(pattern, collection),
            )),
            TriggerSpec::Fields { .. } => {
                warn!(collection = %collection, "trigger has no time/after/afterFailed field; task will only run manually");
                None
            }
        }
    }

    /// Qualify a bare reference name. Patterns containing `.` or `*` are
    /// taken verbatim; a bare name prefers the task's own collection if
    /// such a task exists right now, else the default collection.
    fn qualify_pattern(&self, pattern: &str, collection: &str) -> String {
        if pattern.contains('.') || pattern.contains('*') {
            return pattern.to_string();
        }

        let local = format!("{collection}.{pattern}");
        if self.tasks.contains_key(&local) {
            local
        } else {
            format!("{}.{}", self.default_collection, pattern)
        }
    }

    // ---------------------------------------------------------------
    // Collection documents
    // ---------------------------------------------------------------

    /// Install a loaded collection document: defaults, switch, tasks, and
    /// `sequences` expanded into chained `after` triggers.
    pub fn apply_collection_doc(&mut self, doc: CollectionDoc) -> Result<Vec<TaskId>> {
        self.defaults
            .insert(doc.collection.clone(), doc.defaults.clone());
        self.collections.insert(doc.collection.clone(), doc.config);

        let mut created = Vec::new();
        for (name, task_doc) in doc.tasks {
            let config = TaskConfig {
                name: Some(name),
                collection: Some(doc.collection.clone()),
                command: Some(task_doc.command),
                cwd: task_doc.cwd,
                env: Some(task_doc.env),
                trigger: task_doc.trigger,
                enabled: Some(task_doc.enabled),
            };
            created.push(self.create_task(config)?.id);
        }

        for sequence in &doc.sequences {
            let mut previous: Option<TaskId> = None;
            for step in sequence {
                let step_id = if step.contains('.') {
                    step.clone()
                } else {
                    format!("{}.{}", doc.collection, step)
                };

                if !self.tasks.contains_key(&step_id) {
                    warn!(collection = %doc.collection, step = %step, "sequence step is not a known task; skipping the rest of the sequence");
                    break;
                }

                if let Some(previous_id) = previous.take() {
                    debug!(task = %step_id, after = %previous_id, "chaining sequence step");
                    if let Some(task) = self.tasks.get_mut(&step_id) {
                        task.trigger = Some(Trigger::After(previous_id));
                    }
                }

                previous = Some(step_id);
            }
        }

        Ok(created)
    }

    /// Serialize one collection back into its document shape.
    pub fn collection_doc(&self, name: &str) -> Result<CollectionDoc> {
        let tasks: BTreeMap<String, TaskDoc> = self
            .tasks
            .values()
            .filter(|t| t.collection == name)
            .map(|t| (t.name.clone(), self.task_doc(t)))
            .collect();

        if tasks.is_empty() && !self.collections.contains_key(name) {
            return Err(CrondagError::NotFound(name.to_string()));
        }

        Ok(CollectionDoc {
            collection: name.to_string(),
            defaults: self.defaults.get(name).cloned().unwrap_or_default(),
            config: self.collections.get(name).copied().unwrap_or_default(),
            tasks,
            sequences: Vec::new(),
        })
    }

    /// Collection views for status reporting: filter by task id, by
    /// collection name, or none for everything.
    pub fn collection_docs(&self, filter: Option<&str>) -> Result<Vec<CollectionDoc>> {
        match filter {
            None => self
                .collection_names()
                .iter()
                .map(|name| self.collection_doc(name))
                .collect(),
            Some(filter) => {
                if let Some(task) = self.tasks.get(filter) {
                    // A task id: its collection's view trimmed to that task.
                    let mut doc = self.collection_doc(&task.collection)?;
                    doc.tasks.retain(|name, _| *name == task.name);
                    return Ok(vec![doc]);
                }
                if self.collections.contains_key(filter)
                    || self.tasks.values().any(|t| t.collection == filter)
                {
                    return Ok(vec![self.collection_doc(filter)?]);
                }
                Err(CrondagError::NotFound(filter.to_string()))
            }
        }
    }

    fn task_doc(&self, task: &Task) -> TaskDoc {
        TaskDoc {
            command: task.command.clone(),
            cwd: task.cwd.clone(),
            env: task.env.clone(),
            trigger: task.trigger.as_ref().map(Trigger::to_spec),
            enabled: task.enabled,
        }
    }
}

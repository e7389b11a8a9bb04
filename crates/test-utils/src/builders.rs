use std::collections::BTreeMap;

use crondag::config::model::{CollectionDoc, TaskDefaults, TaskDoc, TriggerSpec};
use crondag::registry::task::TaskConfig;

/// Builder for `TaskConfig` to simplify test setup.
pub struct TaskConfigBuilder {
    config: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            config: TaskConfig {
                name: Some(name.to_string()),
                collection: None,
                command: Some(command.to_string()),
                cwd: None,
                env: None,
                trigger: None,
                enabled: None,
            },
        }
    }

    pub fn collection(mut self, collection: &str) -> Self {
        self.config.collection = Some(collection.to_string());
        self
    }

    pub fn cwd(mut self, cwd: &str) -> Self {
        self.config.cwd = Some(cwd.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config
            .env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Bare-string trigger: a cron expression or a task reference.
    pub fn trigger(mut self, trigger: &str) -> Self {
        self.config.trigger = Some(TriggerSpec::Shorthand(trigger.to_string()));
        self
    }

    pub fn time(mut self, expression: &str) -> Self {
        self.config.trigger = Some(TriggerSpec::Fields {
            time: Some(expression.to_string()),
            after: None,
            after_failed: None,
        });
        self
    }

    pub fn after(mut self, pattern: &str) -> Self {
        self.config.trigger = Some(TriggerSpec::Fields {
            time: None,
            after: Some(pattern.to_string()),
            after_failed: None,
        });
        self
    }

    pub fn after_failed(mut self, pattern: &str) -> Self {
        self.config.trigger = Some(TriggerSpec::Fields {
            time: None,
            after: None,
            after_failed: Some(pattern.to_string()),
        });
        self
    }

    pub fn disabled(mut self) -> Self {
        self.config.enabled = Some(false);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.config
    }
}

/// Builder for collection documents.
pub struct CollectionDocBuilder {
    doc: CollectionDoc,
}

impl CollectionDocBuilder {
    pub fn new(collection: &str) -> Self {
        Self {
            doc: CollectionDoc {
                collection: collection.to_string(),
                defaults: TaskDefaults::default(),
                config: Default::default(),
                tasks: BTreeMap::new(),
                sequences: Vec::new(),
            },
        }
    }

    pub fn with_task(self, name: &str, command: &str) -> Self {
        self.with_task_doc(
            name,
            TaskDoc {
                command: command.to_string(),
                cwd: None,
                env: BTreeMap::new(),
                trigger: None,
                enabled: true,
            },
        )
    }

    pub fn with_task_doc(mut self, name: &str, task: TaskDoc) -> Self {
        self.doc.tasks.insert(name.to_string(), task);
        self
    }

    pub fn with_sequence(mut self, steps: &[&str]) -> Self {
        self.doc
            .sequences
            .push(steps.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn defaults_cwd(mut self, cwd: &str) -> Self {
        self.doc.defaults.cwd = Some(cwd.to_string());
        self
    }

    pub fn defaults_env(mut self, key: &str, value: &str) -> Self {
        self.doc
            .defaults
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.doc.config.enabled = false;
        self
    }

    pub fn build(self) -> CollectionDoc {
        self.doc
    }
}

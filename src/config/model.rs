// src/config/model.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Daemon settings as read from a TOML file:
///
/// ```toml
/// [config]
/// default_collection = "default"
/// worker_to_cpu_ratio = 1.25
/// poll_interval_ms = 1000
/// queue_size = 50
/// collections_dir = "collections"
///
/// [defaults]
/// cwd = "/srv/jobs"
///
/// [defaults.env]
/// PATH = "/usr/local/bin:/usr/bin:/bin"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Global behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Global task defaults from `[defaults]`, merged into every task
    /// below its collection defaults.
    #[serde(default)]
    pub defaults: TaskDefaults,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Collection assumed when a task or reference carries no collection.
    #[serde(default = "default_collection_name")]
    pub default_collection: String,

    /// Worker cap is `ceil(cpu_count * worker_to_cpu_ratio)` unless
    /// `max_workers` is set explicitly.
    #[serde(default = "default_worker_to_cpu_ratio")]
    pub worker_to_cpu_ratio: f64,

    /// Explicit worker cap; overrides the CPU-derived value when set.
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Safety-net admission check interval (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum number of runs waiting in the queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Start with admissions paused.
    #[serde(default)]
    pub pause: bool,

    /// Directory holding collection documents (`*.json`). No directory
    /// means nothing is loaded or saved.
    #[serde(default)]
    pub collections_dir: Option<String>,
}

fn default_collection_name() -> String {
    "default".to_string()
}

fn default_worker_to_cpu_ratio() -> f64 {
    1.25
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_queue_size() -> usize {
    50
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            default_collection: default_collection_name(),
            worker_to_cpu_ratio: default_worker_to_cpu_ratio(),
            max_workers: None,
            poll_interval_ms: default_poll_interval_ms(),
            queue_size: default_queue_size(),
            pause: false,
            collections_dir: None,
        }
    }
}

impl ConfigSection {
    /// Effective worker cap.
    pub fn effective_max_workers(&self) -> usize {
        match self.max_workers {
            Some(n) => n.max(1),
            None => {
                let derived = (num_cpus::get() as f64 * self.worker_to_cpu_ratio).ceil();
                (derived as usize).max(1)
            }
        }
    }
}

/// Task defaults (global `[defaults]` or a collection's `defaults`).
///
/// Fields here are the complete set a task may inherit: explicit task
/// values win over collection defaults, which win over global defaults,
/// with `env` merged key-wise under the same precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// `config` section of a collection document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Trigger as written in documents and create/update payloads.
///
/// Either a bare string (a cron expression if it parses as one, otherwise
/// a reference to a task that must succeed first) or an object with
/// exactly one of `time`, `after`, `afterFailed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerSpec {
    Shorthand(String),
    Fields {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after: Option<String>,
        #[serde(
            default,
            rename = "afterFailed",
            skip_serializing_if = "Option::is_none"
        )]
        after_failed: Option<String>,
    },
}

/// One task entry inside a collection document, keyed by task name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDoc {
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerSpec>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A whole persisted collection:
///
/// ```json
/// {
///   "collection": "reports",
///   "defaults": { "cwd": "/srv/reports" },
///   "config": { "enabled": true },
///   "tasks": {
///     "extract": { "command": "make extract", "trigger": "0 2 * * *" },
///     "transform": { "command": "make transform" },
///     "load": { "command": "make load" }
///   },
///   "sequences": [["extract", "transform", "load"]]
/// }
/// ```
///
/// `sequences` is shorthand for chained `after` triggers: each step runs
/// after the previous one succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDoc {
    pub collection: String,

    #[serde(default)]
    pub defaults: TaskDefaults,

    #[serde(default)]
    pub config: CollectionConfig,

    #[serde(default)]
    pub tasks: BTreeMap<String, TaskDoc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<Vec<String>>,
}

// src/config/validate.rs

//! Semantic validation, separate from parsing.

use crate::config::model::{CollectionDoc, Settings};
use crate::errors::{CrondagError, Result};

/// Sanity-check global settings numbers.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    let config = &settings.config;

    if config.default_collection.is_empty() || config.default_collection.contains('.') {
        return Err(CrondagError::Config(format!(
            "invalid default collection name '{}'",
            config.default_collection
        )));
    }
    if !(config.worker_to_cpu_ratio > 0.0) {
        return Err(CrondagError::Config(format!(
            "worker_to_cpu_ratio must be positive, got {}",
            config.worker_to_cpu_ratio
        )));
    }
    if config.poll_interval_ms == 0 {
        return Err(CrondagError::Config(
            "poll_interval_ms must be at least 1".to_string(),
        ));
    }
    if config.queue_size == 0 {
        return Err(CrondagError::Config(
            "queue_size must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Check a collection document before it reaches the registry.
pub fn validate_collection_doc(doc: &CollectionDoc) -> Result<()> {
    if doc.collection.is_empty() || doc.collection.contains('.') {
        return Err(CrondagError::Config(format!(
            "invalid collection name '{}'",
            doc.collection
        )));
    }

    for (name, task) in &doc.tasks {
        if name.is_empty() || name.contains('.') {
            return Err(CrondagError::Config(format!(
                "invalid task name '{}' in collection '{}'",
                name, doc.collection
            )));
        }
        if task.command.is_empty() {
            return Err(CrondagError::Config(format!(
                "task '{}.{}' has an empty command",
                doc.collection, name
            )));
        }
    }

    for sequence in &doc.sequences {
        if sequence.len() < 2 {
            return Err(CrondagError::Config(format!(
                "sequence in collection '{}' needs at least two steps",
                doc.collection
            )));
        }
        for step in sequence {
            let known = if let Some((collection, name)) = step.split_once('.') {
                collection == doc.collection && doc.tasks.contains_key(name)
            } else {
                doc.tasks.contains_key(step)
            };
            if !known {
                return Err(CrondagError::Config(format!(
                    "sequence step '{}' is not a task of collection '{}'",
                    step, doc.collection
                )));
            }
        }
    }

    Ok(())
}

// src/store.rs

//! Collection document persistence.
//!
//! Collections are stored as one JSON document per collection
//! (`<dir>/<collection>.json`) in the shape of
//! [`crate::config::model::CollectionDoc`]. The store loads every document
//! at startup and re-serialises all collections whenever a task changes;
//! the scheduling core never touches the disk itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::model::CollectionDoc;
use crate::config::validate::validate_collection_doc;
use crate::engine::Notice;
use crate::errors::Result;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone)]
pub struct CollectionStore {
    dir: PathBuf,
}

impl CollectionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read and validate every `*.json` document in the directory.
    /// Malformed or invalid documents are logged and skipped; a missing
    /// directory yields nothing.
    pub fn read_documents(&self) -> Result<Vec<CollectionDoc>> {
        if !self.dir.exists() {
            info!(dir = %self.dir.display(), "collections directory does not exist; nothing to load");
            return Ok(Vec::new());
        }

        let mut docs = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match read_document(&path) {
                Ok(doc) => docs.push(doc),
                Err(err) => {
                    warn!(file = %path.display(), %err, "skipping collection document");
                }
            }
        }

        Ok(docs)
    }

    /// Load every document into the scheduler. Returns the number of
    /// tasks created.
    pub fn load_into(&self, scheduler: &Scheduler) -> Result<usize> {
        let mut loaded = 0;
        for doc in self.read_documents()? {
            let collection = doc.collection.clone();
            match scheduler.load_collection_doc(doc) {
                Ok(created) => {
                    info!(collection = %collection, tasks = created.len(), "loaded collection");
                    loaded += created.len();
                }
                Err(err) => {
                    warn!(collection = %collection, %err, "could not install collection");
                }
            }
        }
        Ok(loaded)
    }

    /// Write every collection back out, one pretty-printed document per
    /// collection.
    pub fn save_all(&self, scheduler: &Scheduler) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        for doc in scheduler.get_tasks(None)? {
            let path = self.dir.join(format!("{}.json", doc.collection));
            let contents = serde_json::to_string_pretty(&doc)?;
            std::fs::write(&path, contents)?;
            debug!(file = %path.display(), "saved collection");
        }

        Ok(())
    }
}

fn read_document(path: &Path) -> Result<CollectionDoc> {
    let contents = std::fs::read_to_string(path)?;
    let doc: CollectionDoc = serde_json::from_str(&contents)?;
    validate_collection_doc(&doc)?;
    Ok(doc)
}

/// Re-save collections whenever a task is created, updated or deleted.
/// Spawn this after the initial load so loading does not save back onto
/// itself.
pub fn spawn_autosave(scheduler: Arc<Scheduler>, store: CollectionStore) -> JoinHandle<()> {
    let mut notices = scheduler.subscribe();

    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(Notice::TaskNew(_) | Notice::TaskUpdated(_) | Notice::TaskDeleted(_)) => {
                    if let Err(err) = store.save_all(&scheduler) {
                        warn!(%err, "autosave failed");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "autosave lagged behind notifications; saving now");
                    if let Err(err) = store.save_all(&scheduler) {
                        warn!(%err, "autosave failed");
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

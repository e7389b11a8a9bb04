// src/config/mod.rs

//! Configuration surface.
//!
//! Two kinds of input live here:
//! - [`model::Settings`]: daemon behaviour from `Crondag.toml`
//!   (worker cap, poll interval, queue size, global task defaults).
//! - [`model::CollectionDoc`]: persisted collection documents (JSON), the
//!   shape the store reads at startup and writes back on task changes.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_settings_path, load_settings, load_settings_or_default};
pub use model::{
    CollectionConfig, CollectionDoc, ConfigSection, Settings, TaskDefaults, TaskDoc, TriggerSpec,
};

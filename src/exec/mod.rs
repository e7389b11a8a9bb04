// src/exec/mod.rs

//! Process execution layer.
//!
//! This module turns admitted runs into OS processes with
//! `tokio::process::Command` and reports back to the engine via
//! [`crate::engine::EngineEvent`]s.
//!
//! - [`backend`] provides the [`WorkerBackend`] trait the engine talks to,
//!   and the concrete [`ProcessBackend`] used in production; tests swap in
//!   a fake implementation.
//! - [`worker`] handles a single run's process: spawn, stdio streaming,
//!   exit reporting and kill-on-shutdown.

pub mod backend;
pub mod worker;

pub use backend::{ProcessBackend, WorkerBackend};

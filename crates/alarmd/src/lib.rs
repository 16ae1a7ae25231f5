//! Alarm Daemon - time-ordered alarm dispatch engine
//!
//! This crate provides the dispatch core behind the `alarm>` prompt:
//! - `list` - the shared, time-ordered alarm list and its locking
//! - `worker` - dispatcher threads that claim, wait for and fire alarms
//! - `lifecycle` - per-type worker pools and cooperative termination
//! - `engine` - the handle that ties them together and publishes events
//! - `config` - engine tunables loaded from TOML
//!
//! # Panic-Free Guarantees
//!
//! Production code in this crate does not `.unwrap()`, `.expect()` or
//! `panic!()`. The one deliberate exception to "return an error" is lock
//! poisoning, which aborts the process (see `sync`).

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod list;
mod sync;
pub mod worker;

pub use config::{ConfigError, EngineConfig};
pub use engine::{spawn_engine, AlarmEngine, CommandOutcome};
pub use error::EngineError;
pub use lifecycle::TerminateReport;

//! Alarm dispatch engine.
//!
//! Ties together the shared alarm list, the per-type worker pools and the
//! event broadcast channel behind a cheap-to-clone [`AlarmEngine`] handle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  Command   ┌──────────────────────┐
//! │  alarm> prompt  │───────────▶│     AlarmEngine      │
//! └─────────────────┘            └───┬──────────────┬───┘
//!          ▲                         │ insert/purge │ ensure/terminate
//!          │                         ▼              ▼
//!          │               ┌──────────────┐  ┌─────────────────────┐
//!          │               │  AlarmList   │◀─│ TypeLifecycleManager│
//!          │               │  (RwLock)    │  │  type → workers     │
//!          │               └──────▲───────┘  └──────────┬──────────┘
//!          │                      │ claim/complete      │ spawn
//!          │   AlarmEvent  ┌──────┴──────────────────────▼──┐
//!          └───────────────│  DispatchWorker threads (N)     │
//!             (broadcast)  └─────────────────────────────────┘
//! ```

use tokio::sync::broadcast;

mod commands;
mod handle;

pub use commands::CommandOutcome;
pub use handle::AlarmEngine;

use crate::config::EngineConfig;

/// Builds an engine from `config` and returns its handle.
///
/// No worker threads exist until a type is scheduled (with
/// `auto_start_workers`) or started explicitly.
///
/// # Example
///
/// ```no_run
/// use alarm_core::{AlarmMessage, AlarmRequest, MessageType};
/// use alarmd::config::EngineConfig;
/// use alarmd::engine::spawn_engine;
///
/// let engine = spawn_engine(EngineConfig::default());
/// let mut events = engine.subscribe();
///
/// let message = AlarmMessage::new("stand up").unwrap();
/// engine
///     .schedule(AlarmRequest::new(5, MessageType::new(1), message))
///     .unwrap();
/// ```
pub fn spawn_engine(config: EngineConfig) -> AlarmEngine {
    let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));
    AlarmEngine::new(config, event_tx)
}

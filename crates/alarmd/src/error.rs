//! Errors returned by engine operations.

use std::io;

use alarm_core::{DomainError, MessageType};
use thiserror::Error;

/// Errors that can occur while scheduling or managing workers.
///
/// Lock poisoning is not represented here: it aborts the process.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The alarm list has reached its capacity.
    #[error("alarm list is full (max: {max} alarms)")]
    ListFull {
        /// Maximum number of pending alarms
        max: usize,
    },

    /// The request itself was invalid.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The OS refused to start a worker thread.
    #[error("failed to start worker for message type {message_type}: {source}")]
    WorkerSpawn {
        message_type: MessageType,
        #[source]
        source: io::Error,
    },
}

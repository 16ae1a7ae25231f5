//! Alarm Core - Shared types for the alarm dispatch engine
//!
//! This crate provides the domain types shared between the
//! dispatch engine (alarmd) and the command protocol.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod alarm;
pub mod error;
pub mod event;

// Re-exports for convenience
pub use alarm::{
    AlarmId, AlarmKey, AlarmMessage, AlarmRecord, AlarmRequest, AlarmView, ClaimState,
    ClaimedAlarm, MessageType, WorkerId, MAX_MESSAGE_LEN,
};
pub use error::{DomainError, DomainResult};
pub use event::AlarmEvent;

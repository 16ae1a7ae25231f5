//! Alarm Protocol - Command grammar and event rendering
//!
//! This crate turns text typed at the `alarm>` prompt into typed
//! [`Command`]s for the engine, and turns engine events back into
//! lines for the terminal.

pub mod command;
pub mod render;

pub use command::{parse_command, Command, ParseError};
pub use render::{render_alarm_list, render_event, render_event_json};

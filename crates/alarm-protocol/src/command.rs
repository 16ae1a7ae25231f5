//! Parsing `alarm>` prompt lines into engine commands.
//!
//! Accepted forms:
//!
//! ```text
//! <seconds> MessageType(<type>) <message>
//! Create_Thread: MessageType(<type>)
//! Terminate_Thread: MessageType(<type>)
//! List
//! ```

use std::fmt;

use alarm_core::{AlarmMessage, AlarmRequest, DomainError, MessageType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CREATE_PREFIX: &str = "Create_Thread:";
const TERMINATE_PREFIX: &str = "Terminate_Thread:";
const TYPE_OPEN: &str = "MessageType(";
const LIST_KEYWORD: &str = "List";

/// A command for the dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Fire `message` after `delay_seconds`, routed by `message_type`.
    Schedule {
        delay_seconds: u32,
        message_type: MessageType,
        message: AlarmMessage,
    },

    /// Ensure a worker exists for `message_type`.
    StartWorkers { message_type: MessageType },

    /// Stop the workers of `message_type` and purge its pending alarms.
    Terminate { message_type: MessageType },

    /// Show the pending alarm list.
    List,
}

impl Command {
    /// Builds the alarm request for a `Schedule` command.
    pub fn as_request(&self) -> Option<AlarmRequest> {
        match self {
            Self::Schedule {
                delay_seconds,
                message_type,
                message,
            } => Some(AlarmRequest::new(*delay_seconds, *message_type, message.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schedule {
                delay_seconds,
                message_type,
                message,
            } => write!(f, "{delay_seconds} {TYPE_OPEN}{message_type}) {message}"),
            Self::StartWorkers { message_type } => {
                write!(f, "{CREATE_PREFIX} {TYPE_OPEN}{message_type})")
            }
            Self::Terminate { message_type } => {
                write!(f, "{TERMINATE_PREFIX} {TYPE_OPEN}{message_type})")
            }
            Self::List => f.write_str(LIST_KEYWORD),
        }
    }
}

/// Errors produced while parsing a prompt line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("invalid delay: {0:?} (expected a non-negative number of seconds)")]
    InvalidDelay(String),

    #[error("expected MessageType(<n>)")]
    MissingMessageType,

    #[error("invalid message type: {0:?}")]
    InvalidMessageType(String),

    #[error("unexpected trailing input: {0:?}")]
    TrailingInput(String),

    #[error("invalid message: {0}")]
    InvalidMessage(#[from] DomainError),
}

/// Parses one prompt line.
///
/// # Errors
///
/// Returns a [`ParseError`] describing the first problem found. Parsing
/// never has side effects, so a bad line can simply be reported and skipped.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    if line.eq_ignore_ascii_case(LIST_KEYWORD) {
        return Ok(Command::List);
    }

    if let Some(rest) = line.strip_prefix(CREATE_PREFIX) {
        let message_type = parse_bare_type(rest)?;
        return Ok(Command::StartWorkers { message_type });
    }

    if let Some(rest) = line.strip_prefix(TERMINATE_PREFIX) {
        let message_type = parse_bare_type(rest)?;
        return Ok(Command::Terminate { message_type });
    }

    parse_schedule(line)
}

fn parse_schedule(line: &str) -> Result<Command, ParseError> {
    let (delay_text, rest) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| ParseError::InvalidDelay(line.to_string()))?;

    let delay_seconds: u32 = delay_text
        .parse()
        .map_err(|_| ParseError::InvalidDelay(delay_text.to_string()))?;

    let (message_type, tail) = parse_type_tag(rest.trim_start())?;
    let message = AlarmMessage::new(tail)?;

    Ok(Command::Schedule {
        delay_seconds,
        message_type,
        message,
    })
}

/// Parses `MessageType(<n>)` with nothing after it.
fn parse_bare_type(input: &str) -> Result<MessageType, ParseError> {
    let (message_type, tail) = parse_type_tag(input.trim_start())?;
    if !tail.is_empty() {
        return Err(ParseError::TrailingInput(tail.to_string()));
    }
    Ok(message_type)
}

/// Parses a leading `MessageType(<n>)`, returning the type and the trimmed rest.
fn parse_type_tag(input: &str) -> Result<(MessageType, &str), ParseError> {
    let rest = input
        .strip_prefix(TYPE_OPEN)
        .ok_or(ParseError::MissingMessageType)?;
    let (number, tail) = rest.split_once(')').ok_or(ParseError::MissingMessageType)?;
    let raw: i32 = number
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidMessageType(number.to_string()))?;
    Ok((MessageType::new(raw), tail.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schedule() {
        let cmd = parse_command("5 MessageType(1) hello there").unwrap();
        assert_eq!(
            cmd,
            Command::Schedule {
                delay_seconds: 5,
                message_type: MessageType::new(1),
                message: AlarmMessage::new("hello there").unwrap(),
            }
        );
    }

    #[test]
    fn test_parse_schedule_tolerates_whitespace() {
        let cmd = parse_command("  10   MessageType( 3 )   wake up  \n").unwrap();
        let request = cmd.as_request().unwrap();
        assert_eq!(request.delay_seconds, 10);
        assert_eq!(request.message_type, MessageType::new(3));
        assert_eq!(request.message.as_str(), "wake up");
    }

    #[test]
    fn test_parse_create_and_terminate() {
        assert_eq!(
            parse_command("Create_Thread: MessageType(2)").unwrap(),
            Command::StartWorkers {
                message_type: MessageType::new(2)
            }
        );
        assert_eq!(
            parse_command("Terminate_Thread: MessageType(-4)").unwrap(),
            Command::Terminate {
                message_type: MessageType::new(-4)
            }
        );
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_command("list").unwrap(), Command::List);
        assert_eq!(parse_command("List").unwrap(), Command::List);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_command("   "), Err(ParseError::Empty));
        assert_eq!(
            parse_command("-3 MessageType(1) hi"),
            Err(ParseError::InvalidDelay("-3".to_string()))
        );
        assert_eq!(parse_command("ten"), Err(ParseError::InvalidDelay("ten".to_string())));
        assert_eq!(parse_command("5 Type(1) hi"), Err(ParseError::MissingMessageType));
        assert_eq!(parse_command("5 MessageType(1 hi"), Err(ParseError::MissingMessageType));
        assert_eq!(
            parse_command("5 MessageType(x) hi"),
            Err(ParseError::InvalidMessageType("x".to_string()))
        );
        assert_eq!(
            parse_command("5 MessageType(1)"),
            Err(ParseError::InvalidMessage(DomainError::EmptyMessage))
        );
        assert_eq!(
            parse_command("Create_Thread: MessageType(1) extra"),
            Err(ParseError::TrailingInput("extra".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_oversized_message() {
        let line = format!("1 MessageType(1) {}", "m".repeat(200));
        assert!(matches!(
            parse_command(&line),
            Err(ParseError::InvalidMessage(DomainError::MessageTooLong { .. }))
        ));
    }

    #[test]
    fn test_display_parses_back() {
        for line in [
            "7 MessageType(2) stand up",
            "Create_Thread: MessageType(2)",
            "Terminate_Thread: MessageType(2)",
            "List",
        ] {
            let cmd = parse_command(line).unwrap();
            assert_eq!(cmd.to_string(), line);
        }
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ParseError::Empty.to_string(), "empty command");
        assert_eq!(
            ParseError::MissingMessageType.to_string(),
            "expected MessageType(<n>)"
        );
    }
}

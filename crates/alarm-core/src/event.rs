//! Notification events published by the dispatch engine.

use crate::{AlarmId, MessageType, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events published by the engine to subscribers.
///
/// Plain data with no required response. The presentation layer decides
/// how to render them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AlarmEvent {
    /// A new alarm was placed into the list.
    Inserted {
        alarm_id: AlarmId,
        message_type: MessageType,
        expires_at: DateTime<Utc>,
    },

    /// A worker was started for a type.
    WorkerStarted {
        worker_id: WorkerId,
        message_type: MessageType,
        at: DateTime<Utc>,
    },

    /// A worker claimed an alarm and is waiting for it to expire.
    Assigned {
        alarm_id: AlarmId,
        message_type: MessageType,
        worker_id: WorkerId,
        message: String,
        expires_at: DateTime<Utc>,
    },

    /// An alarm expired and its message was delivered.
    Fired {
        alarm_id: AlarmId,
        message_type: MessageType,
        worker_id: WorkerId,
        /// The delay originally requested
        seconds: u32,
        message: String,
    },

    /// A claimed alarm was dropped because its type was terminated.
    Abandoned {
        alarm_id: AlarmId,
        message_type: MessageType,
        worker_id: WorkerId,
    },

    /// A worker left its dispatch loop.
    WorkerExited {
        worker_id: WorkerId,
        message_type: MessageType,
    },

    /// All workers of a type were told to stop and its pending alarms purged.
    TypeTerminated {
        message_type: MessageType,
        workers_signalled: usize,
        alarms_removed: usize,
        at: DateTime<Utc>,
    },
}

impl AlarmEvent {
    /// The message type this event concerns.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Inserted { message_type, .. }
            | Self::WorkerStarted { message_type, .. }
            | Self::Assigned { message_type, .. }
            | Self::Fired { message_type, .. }
            | Self::Abandoned { message_type, .. }
            | Self::WorkerExited { message_type, .. }
            | Self::TypeTerminated { message_type, .. } => *message_type,
        }
    }

    /// The alarm this event concerns, if any.
    pub fn alarm_id(&self) -> Option<AlarmId> {
        match self {
            Self::Inserted { alarm_id, .. }
            | Self::Assigned { alarm_id, .. }
            | Self::Fired { alarm_id, .. }
            | Self::Abandoned { alarm_id, .. } => Some(*alarm_id),
            Self::WorkerStarted { .. } | Self::WorkerExited { .. } | Self::TypeTerminated { .. } => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fired_serializes_with_tag() {
        let event = AlarmEvent::Fired {
            alarm_id: AlarmId::new(3),
            message_type: MessageType::new(1),
            worker_id: WorkerId::new(2),
            seconds: 5,
            message: "hello".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "fired");
        assert_eq!(json["alarm_id"], 3);
        assert_eq!(json["message_type"], 1);
        assert_eq!(json["seconds"], 5);
        assert_eq!(json["message"], "hello");
    }

    #[test]
    fn test_accessors() {
        let event = AlarmEvent::WorkerExited {
            worker_id: WorkerId::new(1),
            message_type: MessageType::new(4),
        };
        assert_eq!(event.message_type(), MessageType::new(4));
        assert_eq!(event.alarm_id(), None);

        let event = AlarmEvent::Abandoned {
            alarm_id: AlarmId::new(8),
            message_type: MessageType::new(4),
            worker_id: WorkerId::new(1),
        };
        assert_eq!(event.alarm_id(), Some(AlarmId::new(8)));
    }
}

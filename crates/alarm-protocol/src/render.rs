//! Human-readable and JSON rendering of engine output.

use alarm_core::{AlarmEvent, AlarmView};
use chrono::{DateTime, Utc};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

fn format_time(at: &DateTime<Utc>) -> String {
    at.format(TIME_FORMAT).to_string()
}

/// Renders an event as a single terminal line.
pub fn render_event(event: &AlarmEvent) -> String {
    match event {
        AlarmEvent::Inserted {
            alarm_id,
            message_type,
            expires_at,
        } => format!(
            "Alarm #{alarm_id} with message type ({message_type}) inserted, expires at {}",
            format_time(expires_at)
        ),
        AlarmEvent::WorkerStarted {
            worker_id,
            message_type,
            at,
        } => format!(
            "New alarm worker {worker_id} for message type ({message_type}) started at {}",
            format_time(at)
        ),
        AlarmEvent::Assigned {
            alarm_id,
            message_type,
            worker_id,
            message,
            expires_at,
        } => format!(
            "Alarm #{alarm_id} with message type ({message_type}) assigned to worker {worker_id}, due {}: {message}",
            format_time(expires_at)
        ),
        AlarmEvent::Fired { seconds, message, .. } => format!("({seconds}) {message}"),
        AlarmEvent::Abandoned {
            alarm_id,
            message_type,
            worker_id,
        } => format!(
            "Alarm #{alarm_id} with message type ({message_type}) dropped by worker {worker_id}"
        ),
        AlarmEvent::WorkerExited {
            worker_id,
            message_type,
        } => format!("Alarm worker {worker_id} for message type ({message_type}) exited"),
        AlarmEvent::TypeTerminated {
            message_type,
            workers_signalled,
            alarms_removed,
            at,
        } => format!(
            "All alarm workers for message type ({message_type}) terminated ({workers_signalled} signalled) and {alarms_removed} pending alarm(s) removed at {}",
            format_time(at)
        ),
    }
}

/// Renders an event as one JSON line.
pub fn render_event_json(event: &AlarmEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Renders the pending list, one alarm per line, in list order.
pub fn render_alarm_list(alarms: &[AlarmView], now: DateTime<Utc>) -> String {
    if alarms.is_empty() {
        return "[list: empty]".to_string();
    }

    let mut out = format!("[list: {} pending]", alarms.len());
    for alarm in alarms {
        let owner = match alarm.claimed_by {
            Some(worker) => format!("worker {worker}"),
            None => "unclaimed".to_string(),
        };
        let flag = if alarm.terminate_requested {
            " (terminating)"
        } else {
            ""
        };
        out.push_str(&format!(
            "\n  #{} type ({}) in {}s, {}{}: \"{}\"",
            alarm.id,
            alarm.message_type,
            alarm.seconds_remaining(now).max(0),
            owner,
            flag,
            alarm.message
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_core::{AlarmId, MessageType, WorkerId};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_render_fired_matches_notification_format() {
        let event = AlarmEvent::Fired {
            alarm_id: AlarmId::new(1),
            message_type: MessageType::new(2),
            worker_id: WorkerId::new(3),
            seconds: 5,
            message: "hello".to_string(),
        };
        assert_eq!(render_event(&event), "(5) hello");
    }

    #[test]
    fn test_render_inserted() {
        let event = AlarmEvent::Inserted {
            alarm_id: AlarmId::new(4),
            message_type: MessageType::new(1),
            expires_at: at(0),
        };
        assert_eq!(
            render_event(&event),
            "Alarm #4 with message type (1) inserted, expires at 1970-01-01 00:00:00 UTC"
        );
    }

    #[test]
    fn test_render_json_line() {
        let event = AlarmEvent::WorkerExited {
            worker_id: WorkerId::new(2),
            message_type: MessageType::new(9),
        };
        let line = render_event_json(&event).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"event\":\"worker_exited\""));
    }

    #[test]
    fn test_render_list() {
        assert_eq!(render_alarm_list(&[], at(0)), "[list: empty]");

        let alarms = vec![
            AlarmView {
                id: AlarmId::new(2),
                message_type: MessageType::new(1),
                expires_at: at(12),
                delay_seconds: 2,
                message: "world".to_string(),
                claimed_by: Some(WorkerId::new(1)),
                terminate_requested: false,
            },
            AlarmView {
                id: AlarmId::new(1),
                message_type: MessageType::new(1),
                expires_at: at(15),
                delay_seconds: 5,
                message: "hello".to_string(),
                claimed_by: None,
                terminate_requested: true,
            },
        ];
        let rendered = render_alarm_list(&alarms, at(10));
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "[list: 2 pending]");
        assert_eq!(lines[1], "  #2 type (1) in 2s, worker 1: \"world\"");
        assert_eq!(lines[2], "  #1 type (1) in 5s, unclaimed (terminating): \"hello\"");
    }
}

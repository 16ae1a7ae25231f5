//! Client interface to the dispatch engine.
//!
//! `AlarmEngine` is a cheap-to-clone handle. All clones share one alarm
//! list, one set of worker pools and one event channel. Methods are
//! synchronous and never block for longer than a list critical section.

use std::sync::Arc;
use std::time::Duration;

use alarm_core::{AlarmEvent, AlarmRequest, AlarmView, MessageType, WorkerId};
use alarm_protocol::Command;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::info;

use super::commands::CommandOutcome;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::lifecycle::{TerminateReport, TypeLifecycleManager};
use crate::list::AlarmList;

struct EngineInner {
    config: EngineConfig,
    list: Arc<AlarmList>,
    lifecycle: TypeLifecycleManager,
    events: broadcast::Sender<AlarmEvent>,
}

/// Handle for submitting commands and subscribing to alarm events.
///
/// # Usage
///
/// ```ignore
/// let engine = spawn_engine(config);
/// let mut rx = engine.subscribe();
///
/// engine.start_workers(MessageType::new(1))?;
/// engine.schedule(request)?;
///
/// while let Ok(event) = rx.recv().await {
///     // render event
/// }
/// ```
#[derive(Clone)]
pub struct AlarmEngine {
    inner: Arc<EngineInner>,
}

impl AlarmEngine {
    pub(crate) fn new(config: EngineConfig, events: broadcast::Sender<AlarmEvent>) -> Self {
        let list = Arc::new(AlarmList::new(config.max_pending));
        let lifecycle = TypeLifecycleManager::new(
            Arc::clone(&list),
            events.clone(),
            config.idle_interval(),
            config.max_workers_per_type,
        );

        info!(
            idle_interval_ms = config.idle_interval_ms,
            max_workers_per_type = config.max_workers_per_type,
            auto_start_workers = config.auto_start_workers,
            "Alarm engine created"
        );

        Self {
            inner: Arc::new(EngineInner {
                config,
                list,
                lifecycle,
                events,
            }),
        }
    }

    /// Schedules an alarm relative to now.
    ///
    /// With `auto_start_workers`, a worker is started for the type if it
    /// has none.
    ///
    /// # Errors
    ///
    /// - `EngineError::ListFull` if the list is at capacity
    /// - `EngineError::Domain` if the expiration cannot be represented
    /// - `EngineError::WorkerSpawn` if a worker was needed but could not start
    pub fn schedule(&self, request: AlarmRequest) -> Result<AlarmView, EngineError> {
        self.schedule_at(request, Utc::now())
    }

    /// Schedules an alarm as if submitted at `submitted_at`.
    ///
    /// Alarms submitted in the same second with the same delay and type
    /// share an expiration; they fire in submission order.
    pub fn schedule_at(
        &self,
        request: AlarmRequest,
        submitted_at: DateTime<Utc>,
    ) -> Result<AlarmView, EngineError> {
        let message_type = request.message_type;
        let view = self.inner.list.insert(request, submitted_at)?;

        let _ = self.inner.events.send(AlarmEvent::Inserted {
            alarm_id: view.id,
            message_type,
            expires_at: view.expires_at,
        });

        if self.inner.config.auto_start_workers && self.inner.lifecycle.worker_count(message_type) == 0
        {
            self.inner.lifecycle.ensure_worker_for(message_type)?;
        }

        Ok(view)
    }

    /// Starts a worker for `message_type` unless its pool is full.
    pub fn start_workers(&self, message_type: MessageType) -> Result<Option<WorkerId>, EngineError> {
        self.inner.lifecycle.ensure_worker_for(message_type)
    }

    /// Cooperatively stops `message_type`'s workers and purges its alarms.
    pub fn terminate(&self, message_type: MessageType) -> TerminateReport {
        self.inner.lifecycle.terminate(message_type)
    }

    /// Applies a parsed prompt command.
    pub fn apply(&self, command: Command) -> Result<CommandOutcome, EngineError> {
        match command {
            Command::Schedule {
                delay_seconds,
                message_type,
                message,
            } => {
                let request = AlarmRequest::new(delay_seconds, message_type, message);
                self.schedule(request).map(CommandOutcome::Scheduled)
            }
            Command::StartWorkers { message_type } => {
                let worker_id = self.start_workers(message_type)?;
                Ok(CommandOutcome::WorkerStarted {
                    message_type,
                    worker_id,
                })
            }
            Command::Terminate { message_type } => {
                Ok(CommandOutcome::Terminated(self.terminate(message_type)))
            }
            Command::List => Ok(CommandOutcome::Listing(self.pending())),
        }
    }

    /// Subscribes to alarm events.
    ///
    /// Only events sent after subscribing are received. A subscriber that
    /// falls more than `event_buffer` events behind skips the oldest.
    pub fn subscribe(&self) -> broadcast::Receiver<AlarmEvent> {
        self.inner.events.subscribe()
    }

    /// Pending alarms in list order.
    pub fn pending(&self) -> Vec<AlarmView> {
        self.inner.list.snapshot()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.list.len()
    }

    /// Live alarms of one type, claimed or not.
    pub fn pending_for(&self, message_type: MessageType) -> usize {
        self.inner.list.count_type(message_type)
    }

    /// The next alarm due across all types.
    pub fn next_due(&self) -> Option<AlarmView> {
        self.inner.list.peek_earliest()
    }

    pub fn worker_count(&self, message_type: MessageType) -> usize {
        self.inner.lifecycle.worker_count(message_type)
    }

    /// Types with at least one live worker.
    pub fn active_types(&self) -> Vec<MessageType> {
        self.inner.lifecycle.types()
    }

    /// Worker threads still running, including stopped ones mid-sleep.
    pub fn running_workers(&self) -> usize {
        self.inner.lifecycle.running_threads()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Tells every worker to stop without waiting for them.
    pub fn shutdown(&self) {
        self.inner.lifecycle.shutdown();
    }

    /// Waits up to `timeout` for all worker threads to finish.
    pub fn wait_for_workers(&self, timeout: Duration) -> bool {
        self.inner.lifecycle.wait_for_workers(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use alarm_core::AlarmMessage;
    use alarm_protocol::parse_command;

    fn quiet_config() -> EngineConfig {
        EngineConfig {
            idle_interval_ms: 10,
            auto_start_workers: false,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_schedule_without_auto_start_leaves_alarm_pending() {
        let engine = spawn_engine(quiet_config());
        let request = AlarmRequest::new(1, MessageType::new(1), AlarmMessage::new("a").unwrap());
        let view = engine.schedule(request).unwrap();

        assert_eq!(engine.pending_count(), 1);
        assert_eq!(engine.next_due().unwrap().id, view.id);
        assert_eq!(engine.worker_count(MessageType::new(1)), 0);
        assert!(engine.active_types().is_empty());
    }

    #[test]
    fn test_schedule_publishes_inserted() {
        let engine = spawn_engine(quiet_config());
        let mut rx = engine.subscribe();
        let request = AlarmRequest::new(3, MessageType::new(2), AlarmMessage::new("b").unwrap());
        let view = engine.schedule(request).unwrap();

        match rx.try_recv().unwrap() {
            AlarmEvent::Inserted {
                alarm_id,
                message_type,
                expires_at,
            } => {
                assert_eq!(alarm_id, view.id);
                assert_eq!(message_type, MessageType::new(2));
                assert_eq!(expires_at, view.expires_at);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_apply_parsed_commands() {
        let engine = spawn_engine(quiet_config());

        let outcome = engine
            .apply(parse_command("9 MessageType(3) stretch").unwrap())
            .unwrap();
        assert!(matches!(outcome, CommandOutcome::Scheduled(ref view) if view.message == "stretch"));

        let outcome = engine.apply(parse_command("List").unwrap()).unwrap();
        assert!(matches!(outcome, CommandOutcome::Listing(ref views) if views.len() == 1));

        let outcome = engine
            .apply(parse_command("Terminate_Thread: MessageType(3)").unwrap())
            .unwrap();
        match outcome {
            CommandOutcome::Terminated(report) => {
                assert_eq!(report.alarms_removed, 1);
                assert_eq!(report.workers_signalled, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_capacity_error_surfaces() {
        let engine = spawn_engine(EngineConfig {
            max_pending: 1,
            ..quiet_config()
        });
        let make = || AlarmRequest::new(5, MessageType::new(1), AlarmMessage::new("x").unwrap());
        engine.schedule(make()).unwrap();
        assert!(matches!(
            engine.schedule(make()),
            Err(EngineError::ListFull { max: 1 })
        ));
    }
}

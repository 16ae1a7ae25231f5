//! Results of applying prompt commands to the engine.

use alarm_core::{AlarmView, MessageType, WorkerId};

use crate::lifecycle::TerminateReport;

/// What [`AlarmEngine::apply`](super::AlarmEngine::apply) did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// An alarm was inserted.
    Scheduled(AlarmView),

    /// A worker was started, or `None` when the type's pool was full.
    WorkerStarted {
        message_type: MessageType,
        worker_id: Option<WorkerId>,
    },

    /// A type was terminated.
    Terminated(TerminateReport),

    /// Current pending alarms in list order.
    Listing(Vec<AlarmView>),
}

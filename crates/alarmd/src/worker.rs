//! Dispatcher workers.
//!
//! Each worker is an OS thread bound to one message type for its whole
//! life. It claims the earliest alarm of its type and sleeps toward its
//! expiration with the list unlocked, waking at least once per idle
//! interval. On each wake it claims any alarm of its type that expires
//! before everything it holds, then fires the earliest held claim once due.
//! A worker may hold several claims, fired in expiration order.
//!
//! Stopping is cooperative. A stopped worker claims nothing new, drops
//! claims whose type was terminated, and fires any others when due before
//! exiting. A sleeping worker is never interrupted, so a stop takes effect
//! at most one idle interval later.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use alarm_core::{AlarmEvent, AlarmKey, ClaimedAlarm, MessageType, WorkerId};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::list::{AbandonReason, AlarmList, Completion};

/// Owner-side handle to a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    id: WorkerId,
    message_type: MessageType,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Asks the worker to leave its loop at the next check.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the thread to end. Returns `false` if it panicked.
    pub fn join(self) -> bool {
        self.thread.join().is_ok()
    }
}

/// Starts a worker thread for `message_type`.
///
/// # Errors
///
/// `EngineError::WorkerSpawn` if the OS refuses to create the thread.
pub(crate) fn spawn_worker(
    id: WorkerId,
    message_type: MessageType,
    list: Arc<AlarmList>,
    events: broadcast::Sender<AlarmEvent>,
    idle_interval: Duration,
) -> Result<WorkerHandle, EngineError> {
    let stop = Arc::new(AtomicBool::new(false));

    let worker = DispatchWorker {
        id,
        message_type,
        list,
        events,
        stop: Arc::clone(&stop),
        idle_interval,
    };

    let thread = thread::Builder::new()
        .name(format!("alarm-worker-{id}"))
        .spawn(move || worker.run())
        .map_err(|source| EngineError::WorkerSpawn {
            message_type,
            source,
        })?;

    Ok(WorkerHandle {
        id,
        message_type,
        stop,
        thread,
    })
}

struct DispatchWorker {
    id: WorkerId,
    message_type: MessageType,
    list: Arc<AlarmList>,
    events: broadcast::Sender<AlarmEvent>,
    stop: Arc<AtomicBool>,
    idle_interval: Duration,
}

impl DispatchWorker {
    fn run(self) {
        info!(
            worker_id = %self.id,
            message_type = %self.message_type,
            "Dispatch worker starting"
        );
        self.publish(AlarmEvent::WorkerStarted {
            worker_id: self.id,
            message_type: self.message_type,
            at: Utc::now(),
        });

        let mut fired: u64 = 0;
        let mut held: BTreeMap<AlarmKey, ClaimedAlarm> = BTreeMap::new();

        loop {
            if self.stop.load(Ordering::Acquire) {
                self.drop_terminated(&mut held);
                if held.is_empty() {
                    break;
                }
            } else if let Some(claim) = self.claim_ahead_of(&held) {
                held.insert(claim.key(), claim);
                continue;
            }

            let Some(mut entry) = held.first_entry() else {
                thread::sleep(self.idle_interval);
                continue;
            };

            let remaining = entry.get().remaining(Utc::now());
            if !remaining.is_zero() {
                // Wake at least once per idle interval to pick up alarms
                // that expire sooner than the ones already held.
                let nap = remaining.min(self.idle_interval);
                debug!(
                    worker_id = %self.id,
                    alarm_id = %entry.get().id,
                    sleep_ms = nap.as_millis() as u64,
                    "Waiting for alarm"
                );
                thread::sleep(nap);
                continue;
            }

            thread::yield_now();
            let claim = entry.remove();
            match self.finish(&claim) {
                Completion::Fired => fired += 1,
                Completion::Abandoned(AbandonReason::Terminated) => {
                    info!(
                        worker_id = %self.id,
                        alarm_id = %claim.id,
                        "Alarm type terminated during sleep, worker exiting"
                    );
                    self.drop_terminated(&mut held);
                    break;
                }
                Completion::Abandoned(reason) => {
                    warn!(
                        worker_id = %self.id,
                        alarm_id = %claim.id,
                        ?reason,
                        "Claimed alarm could not be fired"
                    );
                }
            }
        }

        self.publish(AlarmEvent::WorkerExited {
            worker_id: self.id,
            message_type: self.message_type,
        });
        info!(
            worker_id = %self.id,
            message_type = %self.message_type,
            fired,
            "Dispatch worker stopped"
        );
    }

    /// Claims the earliest unclaimed alarm of this worker's type that is
    /// due before everything it already holds.
    fn claim_ahead_of(&self, held: &BTreeMap<AlarmKey, ClaimedAlarm>) -> Option<ClaimedAlarm> {
        let before = held.keys().next().copied();
        let claim = self
            .list
            .claim_next_before(self.message_type, self.id, before)?;

        self.publish(AlarmEvent::Assigned {
            alarm_id: claim.id,
            message_type: claim.message_type,
            worker_id: self.id,
            message: claim.message.as_str().to_string(),
            expires_at: claim.expires_at,
        });
        Some(claim)
    }

    /// Releases held claims whose type was terminated, without firing them.
    fn drop_terminated(&self, held: &mut BTreeMap<AlarmKey, ClaimedAlarm>) {
        held.retain(|_, claim| {
            if !self.list.abandon_if_terminated(claim) {
                return true;
            }
            self.publish(AlarmEvent::Abandoned {
                alarm_id: claim.id,
                message_type: claim.message_type,
                worker_id: self.id,
            });
            false
        });
    }

    fn finish(&self, claim: &ClaimedAlarm) -> Completion {
        let outcome = self.list.complete(claim, |record| {
            self.publish(AlarmEvent::Fired {
                alarm_id: record.id(),
                message_type: record.message_type(),
                worker_id: self.id,
                seconds: record.delay_seconds(),
                message: record.message().as_str().to_string(),
            });
        });

        if let Completion::Abandoned(_) = outcome {
            self.publish(AlarmEvent::Abandoned {
                alarm_id: claim.id,
                message_type: claim.message_type,
                worker_id: self.id,
            });
        }
        outcome
    }

    fn publish(&self, event: AlarmEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_core::{AlarmMessage, AlarmRequest};
    use std::time::Instant;

    fn request(delay: u32, message_type: i32, text: &str) -> AlarmRequest {
        AlarmRequest::new(
            delay,
            MessageType::new(message_type),
            AlarmMessage::new(text).unwrap(),
        )
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    #[test]
    fn test_worker_fires_due_alarm_and_stops() {
        let list = Arc::new(AlarmList::new(100));
        let (events, mut rx) = broadcast::channel(64);
        list.insert(request(0, 1, "now"), Utc::now()).unwrap();

        let handle = spawn_worker(
            WorkerId::new(1),
            MessageType::new(1),
            Arc::clone(&list),
            events,
            Duration::from_millis(10),
        )
        .unwrap();

        assert!(wait_until(Duration::from_secs(2), || list.is_empty()));
        handle.request_stop();
        assert!(handle.join());

        let mut fired = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AlarmEvent::Fired { message, .. } = event {
                fired.push(message);
            }
        }
        assert_eq!(fired, vec!["now"]);
    }

    #[test]
    fn test_worker_ignores_other_types() {
        let list = Arc::new(AlarmList::new(100));
        let (events, _rx) = broadcast::channel(64);
        list.insert(request(0, 2, "not mine"), Utc::now()).unwrap();

        let handle = spawn_worker(
            WorkerId::new(1),
            MessageType::new(1),
            Arc::clone(&list),
            events,
            Duration::from_millis(10),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(list.len(), 1);
        assert_eq!(list.snapshot()[0].claimed_by, None);

        handle.request_stop();
        assert!(handle.join());
    }

    #[test]
    fn test_terminated_claim_is_dropped_without_waiting_for_expiry() {
        let list = Arc::new(AlarmList::new(100));
        let (events, mut rx) = broadcast::channel(64);
        list.insert(request(30, 1, "far off"), Utc::now()).unwrap();

        let handle = spawn_worker(
            WorkerId::new(1),
            MessageType::new(1),
            Arc::clone(&list),
            events,
            Duration::from_millis(10),
        )
        .unwrap();
        assert!(wait_until(Duration::from_secs(1), || !list.has_claimable(MessageType::new(1))));

        list.purge_type(MessageType::new(1));
        handle.request_stop();
        assert!(wait_until(Duration::from_secs(1), || handle.is_finished()));
        assert!(handle.join());
        assert!(list.is_empty());

        let events: Vec<AlarmEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.iter().any(|e| matches!(e, AlarmEvent::Abandoned { .. })));
        assert!(!events.iter().any(|e| matches!(e, AlarmEvent::Fired { .. })));
    }

    #[test]
    fn test_idle_worker_exits_on_stop() {
        let list = Arc::new(AlarmList::new(100));
        let (events, mut rx) = broadcast::channel(64);

        let handle = spawn_worker(
            WorkerId::new(5),
            MessageType::new(3),
            list,
            events,
            Duration::from_millis(10),
        )
        .unwrap();
        assert_eq!(handle.id(), WorkerId::new(5));
        assert_eq!(handle.message_type(), MessageType::new(3));

        handle.request_stop();
        assert!(handle.stop_requested());
        assert!(wait_until(Duration::from_secs(1), || handle.is_finished()));
        assert!(handle.join());

        let events: Vec<AlarmEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(events.first(), Some(AlarmEvent::WorkerStarted { .. })));
        assert!(matches!(events.last(), Some(AlarmEvent::WorkerExited { .. })));
    }
}

//! Worker pools per message type.
//!
//! Starts workers on demand, stops them cooperatively when their type is
//! terminated, and keeps stopped-but-still-sleeping workers around until
//! their threads finish so shutdown can wait for them.
//!
//! Lock order: the worker registry mutex is released before the alarm list
//! is touched, and workers never take the registry mutex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use alarm_core::{AlarmEvent, MessageType, WorkerId};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::list::AlarmList;
use crate::sync;
use crate::worker::{spawn_worker, WorkerHandle};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of terminating a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminateReport {
    pub message_type: MessageType,
    /// Live workers told to stop
    pub workers_signalled: usize,
    /// Unclaimed alarms removed from the list
    pub alarms_removed: usize,
    /// Claimed alarms that will be dropped when their worker wakes
    pub claims_abandoned: usize,
}

impl TerminateReport {
    /// Whether the type had anything to terminate.
    pub fn is_noop(&self) -> bool {
        self.workers_signalled == 0 && self.alarms_removed == 0 && self.claims_abandoned == 0
    }
}

#[derive(Debug, Default)]
struct WorkerRegistry {
    pools: HashMap<MessageType, Vec<WorkerHandle>>,
    /// Stopped workers whose threads may still be sleeping
    retired: Vec<WorkerHandle>,
}

impl WorkerRegistry {
    fn retire(&mut self, handles: Vec<WorkerHandle>) {
        for handle in handles {
            handle.request_stop();
            self.retired.push(handle);
        }
        self.reap();
    }

    /// Joins retired workers that have finished.
    fn reap(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.retired.drain(..).partition(WorkerHandle::is_finished);
        self.retired = running;
        for handle in finished {
            let id = handle.id();
            if !handle.join() {
                warn!(worker_id = %id, "Worker thread panicked");
            }
        }
    }
}

/// Creates, tracks and stops dispatcher workers.
pub struct TypeLifecycleManager {
    list: Arc<AlarmList>,
    events: broadcast::Sender<AlarmEvent>,
    registry: Mutex<WorkerRegistry>,
    next_worker_id: AtomicU64,
    idle_interval: Duration,
    max_workers_per_type: usize,
}

impl TypeLifecycleManager {
    pub fn new(
        list: Arc<AlarmList>,
        events: broadcast::Sender<AlarmEvent>,
        idle_interval: Duration,
        max_workers_per_type: usize,
    ) -> Self {
        Self {
            list,
            events,
            registry: Mutex::new(WorkerRegistry::default()),
            next_worker_id: AtomicU64::new(1),
            idle_interval,
            max_workers_per_type: max_workers_per_type.max(1),
        }
    }

    /// Starts a worker for `message_type` unless its pool is full.
    ///
    /// Returns the new worker's id, or `None` when the type already has
    /// `max_workers_per_type` live workers. Calling this repeatedly is safe.
    ///
    /// # Errors
    ///
    /// `EngineError::WorkerSpawn` if the thread cannot be created.
    pub fn ensure_worker_for(
        &self,
        message_type: MessageType,
    ) -> Result<Option<WorkerId>, EngineError> {
        let mut registry = sync::lock(&self.registry, "ensure_worker");
        let pool = registry.pools.entry(message_type).or_default();

        pool.retain(|handle| !handle.is_finished());
        if pool.len() >= self.max_workers_per_type {
            debug!(
                message_type = %message_type,
                workers = pool.len(),
                "Worker pool already full"
            );
            return Ok(None);
        }

        let id = WorkerId::new(self.next_worker_id.fetch_add(1, Ordering::Relaxed));
        let handle = spawn_worker(
            id,
            message_type,
            Arc::clone(&self.list),
            self.events.clone(),
            self.idle_interval,
        )?;
        pool.push(handle);

        info!(
            worker_id = %id,
            message_type = %message_type,
            pool_size = pool.len(),
            "Worker started"
        );
        Ok(Some(id))
    }

    /// Stops every worker of `message_type` and purges its alarms.
    ///
    /// Workers are signalled, not interrupted: one sleeping on a claimed
    /// alarm exits when it wakes, without firing. Terminating a type with
    /// no workers and no alarms returns an all-zero report.
    pub fn terminate(&self, message_type: MessageType) -> TerminateReport {
        let workers_signalled = {
            let mut registry = sync::lock(&self.registry, "terminate");
            let handles = registry.pools.remove(&message_type).unwrap_or_default();
            let live = handles.iter().filter(|h| !h.is_finished()).count();
            registry.retire(handles);
            live
        };

        let purge = self.list.purge_type(message_type);

        let report = TerminateReport {
            message_type,
            workers_signalled,
            alarms_removed: purge.removed,
            claims_abandoned: purge.flagged,
        };

        info!(
            message_type = %message_type,
            workers = report.workers_signalled,
            removed = report.alarms_removed,
            abandoned = report.claims_abandoned,
            "Message type terminated"
        );

        let _ = self.events.send(AlarmEvent::TypeTerminated {
            message_type,
            workers_signalled: report.workers_signalled,
            alarms_removed: report.alarms_removed,
            at: Utc::now(),
        });

        report
    }

    /// Number of live workers bound to `message_type`.
    pub fn worker_count(&self, message_type: MessageType) -> usize {
        let registry = sync::lock(&self.registry, "worker_count");
        registry
            .pools
            .get(&message_type)
            .map(|pool| pool.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Types that currently have a worker pool, sorted.
    pub fn types(&self) -> Vec<MessageType> {
        let registry = sync::lock(&self.registry, "types");
        let mut types: Vec<MessageType> = registry
            .pools
            .iter()
            .filter(|(_, pool)| pool.iter().any(|h| !h.is_finished()))
            .map(|(message_type, _)| *message_type)
            .collect();
        types.sort();
        types
    }

    /// Threads not yet finished, including stopped ones still sleeping.
    pub fn running_threads(&self) -> usize {
        let registry = sync::lock(&self.registry, "running_threads");
        registry
            .pools
            .values()
            .flatten()
            .chain(registry.retired.iter())
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Tells every worker to stop. Does not wait.
    pub fn shutdown(&self) {
        let mut registry = sync::lock(&self.registry, "shutdown");
        let handles: Vec<WorkerHandle> = registry.pools.drain().flat_map(|(_, pool)| pool).collect();
        let count = handles.len();
        registry.retire(handles);
        info!(workers = count, "All workers signalled to stop");
    }

    /// Waits up to `timeout` for every worker thread to finish.
    ///
    /// Returns `true` if none are left running.
    pub fn wait_for_workers(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut registry = sync::lock(&self.registry, "wait_for_workers");
                registry.reap();
            }
            if self.running_threads() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }
    }
}

impl Drop for TypeLifecycleManager {
    fn drop(&mut self) {
        // Detach threads; they notice the flag at their next check.
        if let Ok(registry) = self.registry.get_mut() {
            for handle in registry.pools.values().flatten() {
                handle.request_stop();
            }
        }
    }
}

//! The shared alarm list.
//!
//! Pending alarms ordered by `(expires_at, message_type, id)`. The list is
//! shared as `Arc<AlarmList>` between the control side (inserts, purges)
//! and every dispatcher worker (claims, completions).
//!
//! # Locking
//!
//! A single `RwLock` guards the whole list:
//! - insert, claim, complete, remove and purge take the write lock
//! - inspection (`len`, `snapshot`, `peek_earliest`, ...) takes the read lock
//! - workers check for claimable work under the read lock first, so idle
//!   workers scanning concurrently do not serialize on the write lock
//!
//! No method blocks or sleeps while holding the lock.
//!
//! # Ownership
//!
//! Records live only inside the list. Claiming hands the worker a
//! [`ClaimedAlarm`] snapshot, and every later access goes back through the
//! list by id, so a removed record can never be reached again.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use alarm_core::{
    AlarmId, AlarmKey, AlarmRecord, AlarmRequest, AlarmView, ClaimedAlarm, MessageType, WorkerId,
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::sync;

/// Outcome of [`AlarmList::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The emit callback ran and the record was removed.
    Fired,
    /// The record was not emitted.
    Abandoned(AbandonReason),
}

/// Why a claimed record was not emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The record's type was terminated while it was claimed; it has now
    /// been removed.
    Terminated,
    /// The record is no longer in the list.
    Missing,
    /// The record is claimed by a different worker. Left untouched.
    NotOwner,
}

/// Counts from [`AlarmList::purge_type`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Unclaimed records removed outright
    pub removed: usize,
    /// Claimed records flagged for their owners to drop
    pub flagged: usize,
}

#[derive(Debug, Default)]
struct ListState {
    entries: BTreeMap<AlarmKey, AlarmRecord>,
    index: HashMap<AlarmId, AlarmKey>,
    next_id: u64,
}

impl ListState {
    fn remove_key(&mut self, key: AlarmKey) -> Option<AlarmRecord> {
        self.index.remove(&key.id);
        self.entries.remove(&key)
    }
}

/// Time-ordered pending alarms with their lock.
#[derive(Debug)]
pub struct AlarmList {
    state: RwLock<ListState>,
    max_pending: usize,
}

impl AlarmList {
    /// Creates an empty list holding at most `max_pending` alarms.
    pub fn new(max_pending: usize) -> Self {
        Self {
            state: RwLock::new(ListState {
                next_id: 1,
                ..ListState::default()
            }),
            max_pending,
        }
    }

    /// Inserts a new alarm in expiration order and returns its view.
    ///
    /// # Errors
    ///
    /// - `EngineError::ListFull` if the list is at capacity
    /// - `EngineError::Domain` if the expiration overflows
    pub fn insert(
        &self,
        request: AlarmRequest,
        submitted_at: DateTime<Utc>,
    ) -> Result<AlarmView, EngineError> {
        let mut state = sync::write(&self.state, "insert");

        if state.entries.len() >= self.max_pending {
            return Err(EngineError::ListFull {
                max: self.max_pending,
            });
        }

        let id = AlarmId::new(state.next_id);
        let record = AlarmRecord::new(id, request, submitted_at)?;
        state.next_id += 1;

        let key = record.key();
        let view = record.to_view();
        state.index.insert(id, key);
        state.entries.insert(key, record);

        debug!(
            alarm_id = %id,
            message_type = %key.message_type,
            expires_at = %key.expires_at,
            pending = state.entries.len(),
            "Alarm inserted"
        );

        Ok(view)
    }

    /// Claims the earliest unclaimed alarm of `message_type` for `worker`.
    ///
    /// Returns `None` when there is nothing to claim. Losing a race to
    /// another worker also yields `None`; the caller simply scans again.
    pub fn claim_next(&self, message_type: MessageType, worker: WorkerId) -> Option<ClaimedAlarm> {
        self.claim_next_before(message_type, worker, None)
    }

    /// Like [`claim_next`](Self::claim_next), but only claims an alarm
    /// ordered strictly before `before`.
    ///
    /// A worker already holding claims passes its earliest one here so that
    /// an alarm inserted later but expiring sooner is picked up ahead of it.
    pub fn claim_next_before(
        &self,
        message_type: MessageType,
        worker: WorkerId,
        before: Option<AlarmKey>,
    ) -> Option<ClaimedAlarm> {
        if !self.has_claimable_before(message_type, before) {
            return None;
        }

        let mut state = sync::write(&self.state, "claim");
        let record = match before {
            Some(bound) => state
                .entries
                .range_mut(..bound)
                .map(|(_, record)| record)
                .find(|record| record.is_claimable_by(message_type)),
            None => state
                .entries
                .values_mut()
                .find(|record| record.is_claimable_by(message_type)),
        }?;

        if !record.claim(worker) {
            return None;
        }

        debug!(
            alarm_id = %record.id(),
            message_type = %message_type,
            worker_id = %worker,
            "Alarm claimed"
        );
        Some(record.to_claimed(worker))
    }

    /// Whether any alarm of `message_type` is waiting to be claimed.
    pub fn has_claimable(&self, message_type: MessageType) -> bool {
        self.has_claimable_before(message_type, None)
    }

    fn has_claimable_before(&self, message_type: MessageType, before: Option<AlarmKey>) -> bool {
        let state = sync::read(&self.state, "scan");
        match before {
            Some(bound) => state
                .entries
                .range(..bound)
                .any(|(_, record)| record.is_claimable_by(message_type)),
            None => state
                .entries
                .values()
                .any(|record| record.is_claimable_by(message_type)),
        }
    }

    /// Finishes a claim after its sleep.
    ///
    /// Under one exclusive critical section: if the record is still owned by
    /// the claiming worker and not flagged for termination, `emit` runs and
    /// the record is removed. A flagged record is removed without emitting.
    pub fn complete<F>(&self, claim: &ClaimedAlarm, emit: F) -> Completion
    where
        F: FnOnce(&AlarmRecord),
    {
        let mut state = sync::write(&self.state, "complete");

        let Some(key) = state.index.get(&claim.id).copied() else {
            return Completion::Abandoned(AbandonReason::Missing);
        };

        let status = state
            .entries
            .get(&key)
            .map(|record| (record.is_owned_by(claim.worker), record.terminate_requested()));

        let (owned, terminated) = match status {
            Some(status) => status,
            None => {
                warn!(alarm_id = %claim.id, "Index entry without record, dropping it");
                state.index.remove(&claim.id);
                return Completion::Abandoned(AbandonReason::Missing);
            }
        };

        if !owned {
            warn!(
                alarm_id = %claim.id,
                worker_id = %claim.worker,
                "Completion attempted by a worker that does not own the alarm"
            );
            return Completion::Abandoned(AbandonReason::NotOwner);
        }

        if terminated {
            state.remove_key(key);
            return Completion::Abandoned(AbandonReason::Terminated);
        }

        if let Some(record) = state.entries.get(&key) {
            emit(record);
        }
        state.remove_key(key);
        Completion::Fired
    }

    /// Drops a claim early if its type has been terminated.
    ///
    /// Returns `true` when the record was flagged and has been removed
    /// without emitting. An unflagged claim is left for `complete`.
    pub fn abandon_if_terminated(&self, claim: &ClaimedAlarm) -> bool {
        let mut state = sync::write(&self.state, "abandon");
        let Some(key) = state.index.get(&claim.id).copied() else {
            return false;
        };
        let flagged = state.entries.get(&key).is_some_and(|record| {
            record.is_owned_by(claim.worker) && record.terminate_requested()
        });
        if flagged {
            state.remove_key(key);
        }
        flagged
    }

    /// Removes an unclaimed alarm by id.
    ///
    /// No-op if it is already gone. A claimed alarm belongs to its worker
    /// and is left in place.
    pub fn remove(&self, id: AlarmId) -> Option<AlarmRecord> {
        let mut state = sync::write(&self.state, "remove");
        let key = state.index.get(&id).copied()?;
        if state
            .entries
            .get(&key)
            .is_some_and(|record| record.claim_state().is_claimed())
        {
            debug!(alarm_id = %id, "Refusing to remove a claimed alarm");
            return None;
        }
        state.remove_key(key)
    }

    /// Flags every alarm of `message_type` for termination, removing the
    /// unclaimed ones. Claimed ones stay until their owner wakes and drops
    /// them.
    pub fn purge_type(&self, message_type: MessageType) -> PurgeReport {
        let mut state = sync::write(&self.state, "purge");

        let keys: Vec<AlarmKey> = state
            .entries
            .keys()
            .filter(|key| key.message_type == message_type)
            .copied()
            .collect();

        let mut report = PurgeReport::default();
        for key in keys {
            let claimed = match state.entries.get_mut(&key) {
                Some(record) => {
                    record.request_termination();
                    record.claim_state().is_claimed()
                }
                None => continue,
            };

            if claimed {
                report.flagged += 1;
            } else {
                state.remove_key(key);
                report.removed += 1;
            }
        }

        debug!(
            message_type = %message_type,
            removed = report.removed,
            flagged = report.flagged,
            "Alarm type purged"
        );
        report
    }

    /// The next alarm to expire across all types.
    pub fn peek_earliest(&self) -> Option<AlarmView> {
        let state = sync::read(&self.state, "peek");
        state.entries.values().next().map(AlarmRecord::to_view)
    }

    pub fn len(&self) -> usize {
        sync::read(&self.state, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live alarms of `message_type`, claimed or not.
    pub fn count_type(&self, message_type: MessageType) -> usize {
        let state = sync::read(&self.state, "count");
        state
            .entries
            .keys()
            .filter(|key| key.message_type == message_type)
            .count()
    }

    /// All pending alarms in list order.
    pub fn snapshot(&self) -> Vec<AlarmView> {
        let state = sync::read(&self.state, "snapshot");
        state.entries.values().map(AlarmRecord::to_view).collect()
    }
}

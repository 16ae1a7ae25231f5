//! Alarm domain entities and value objects.

use crate::{DomainError, DomainResult};
use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Maximum payload size of an alarm message, in bytes.
pub const MAX_MESSAGE_LEN: usize = 128;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for an alarm record.
///
/// Assigned by the alarm list at insertion time from a monotonically
/// increasing counter, so a lower id always means an earlier insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(u64);

impl AlarmId {
    /// Creates an alarm id from its raw value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a dispatcher worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Creates a worker id from its raw value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category tag that routes an alarm to a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(i32);

impl MessageType {
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for MessageType {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

// ============================================================================
// Message Payload
// ============================================================================

/// Validated alarm payload: non-empty, at most [`MAX_MESSAGE_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlarmMessage(String);

impl AlarmMessage {
    /// Creates a message, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// - `DomainError::EmptyMessage` if nothing remains after trimming
    /// - `DomainError::MessageTooLong` if the trimmed text exceeds the limit
    pub fn new(text: impl Into<String>) -> DomainResult<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyMessage);
        }
        if trimmed.len() > MAX_MESSAGE_LEN {
            return Err(DomainError::MessageTooLong {
                len: trimmed.len(),
                max: MAX_MESSAGE_LEN,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlarmMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AlarmMessage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AlarmMessage {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AlarmMessage> for String {
    fn from(message: AlarmMessage) -> Self {
        message.0
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A parsed "fire `message` after `delay_seconds`, tagged `message_type`" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmRequest {
    pub delay_seconds: u32,
    pub message_type: MessageType,
    pub message: AlarmMessage,
}

impl AlarmRequest {
    pub fn new(delay_seconds: u32, message_type: MessageType, message: AlarmMessage) -> Self {
        Self {
            delay_seconds,
            message_type,
            message,
        }
    }

    /// Computes the absolute expiration for a request submitted at `submitted_at`.
    ///
    /// Expirations have whole-second precision: the sub-second part of the
    /// submission time is dropped before the delay is added.
    pub fn expires_at(&self, submitted_at: DateTime<Utc>) -> DomainResult<DateTime<Utc>> {
        submitted_at
            .trunc_subsecs(0)
            .checked_add_signed(ChronoDuration::seconds(i64::from(self.delay_seconds)))
            .ok_or(DomainError::ExpirationOverflow {
                delay_seconds: self.delay_seconds,
            })
    }
}

// ============================================================================
// Records
// ============================================================================

/// Dispatch state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimState {
    #[default]
    Unclaimed,
    Claimed(WorkerId),
}

impl ClaimState {
    pub fn owner(&self) -> Option<WorkerId> {
        match self {
            Self::Unclaimed => None,
            Self::Claimed(worker) => Some(*worker),
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed(_))
    }
}

/// Sort key of a record in the alarm list.
///
/// Field order defines the ordering: expiration first, then type,
/// then insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlarmKey {
    pub expires_at: DateTime<Utc>,
    pub message_type: MessageType,
    pub id: AlarmId,
}

/// A pending alarm owned by the alarm list.
///
/// Request data is immutable after construction. Only the claim state and
/// the termination flag change, and only through the methods below.
#[derive(Debug, Clone)]
pub struct AlarmRecord {
    id: AlarmId,
    message_type: MessageType,
    expires_at: DateTime<Utc>,
    delay_seconds: u32,
    message: AlarmMessage,
    claim_state: ClaimState,
    terminate_requested: bool,
}

impl AlarmRecord {
    /// Builds a record for `request` submitted at `submitted_at`.
    pub fn new(id: AlarmId, request: AlarmRequest, submitted_at: DateTime<Utc>) -> DomainResult<Self> {
        let expires_at = request.expires_at(submitted_at)?;
        Ok(Self {
            id,
            message_type: request.message_type,
            expires_at,
            delay_seconds: request.delay_seconds,
            message: request.message,
            claim_state: ClaimState::Unclaimed,
            terminate_requested: false,
        })
    }

    pub fn id(&self) -> AlarmId {
        self.id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn delay_seconds(&self) -> u32 {
        self.delay_seconds
    }

    pub fn message(&self) -> &AlarmMessage {
        &self.message
    }

    pub fn claim_state(&self) -> ClaimState {
        self.claim_state
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate_requested
    }

    pub fn key(&self) -> AlarmKey {
        AlarmKey {
            expires_at: self.expires_at,
            message_type: self.message_type,
            id: self.id,
        }
    }

    /// Whether a worker bound to `message_type` may claim this record.
    pub fn is_claimable_by(&self, message_type: MessageType) -> bool {
        self.message_type == message_type
            && !self.claim_state.is_claimed()
            && !self.terminate_requested
    }

    pub fn is_owned_by(&self, worker: WorkerId) -> bool {
        self.claim_state.owner() == Some(worker)
    }

    /// Marks the record claimed by `worker`.
    ///
    /// Returns `false` without changing anything if the record was already
    /// claimed or is flagged for termination.
    pub fn claim(&mut self, worker: WorkerId) -> bool {
        if self.claim_state.is_claimed() || self.terminate_requested {
            return false;
        }
        self.claim_state = ClaimState::Claimed(worker);
        true
    }

    pub fn request_termination(&mut self) {
        self.terminate_requested = true;
    }

    /// Snapshot handed to the claiming worker.
    pub fn to_claimed(&self, worker: WorkerId) -> ClaimedAlarm {
        ClaimedAlarm {
            id: self.id,
            message_type: self.message_type,
            expires_at: self.expires_at,
            delay_seconds: self.delay_seconds,
            message: self.message.clone(),
            worker,
        }
    }

    pub fn to_view(&self) -> AlarmView {
        AlarmView {
            id: self.id,
            message_type: self.message_type,
            expires_at: self.expires_at,
            delay_seconds: self.delay_seconds,
            message: self.message.as_str().to_string(),
            claimed_by: self.claim_state.owner(),
            terminate_requested: self.terminate_requested,
        }
    }
}

/// What a worker holds after a successful claim.
///
/// Owns copies of the request data, never a reference into the list.
/// Every later access to the record goes back through the list by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedAlarm {
    pub id: AlarmId,
    pub message_type: MessageType,
    pub expires_at: DateTime<Utc>,
    pub delay_seconds: u32,
    pub message: AlarmMessage,
    pub worker: WorkerId,
}

impl ClaimedAlarm {
    /// The claimed record's position in the alarm list.
    pub fn key(&self) -> AlarmKey {
        AlarmKey {
            expires_at: self.expires_at,
            message_type: self.message_type,
            id: self.id,
        }
    }

    /// Time left until expiration, zero if already due.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Read-only view of a record for display and inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmView {
    pub id: AlarmId,
    pub message_type: MessageType,
    pub expires_at: DateTime<Utc>,
    pub delay_seconds: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<WorkerId>,
    pub terminate_requested: bool,
}

impl AlarmView {
    /// Whole seconds until expiration; negative once overdue.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }
}

//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Alarm message was empty after trimming
    #[error("Alarm message must not be empty")]
    EmptyMessage,

    /// Alarm message exceeded the payload limit
    #[error("Alarm message too long: {len} bytes (max {max})")]
    MessageTooLong { len: usize, max: usize },

    /// Expiration could not be represented
    #[error("Delay of {delay_seconds}s overflows the expiration time")]
    ExpirationOverflow { delay_seconds: u32 },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

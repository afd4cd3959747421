//! Error types for swen-pool.

use std::path::PathBuf;

use swen_types::{InvalidTransition, TicketId};
use thiserror::Error;

/// Errors that can occur in ticket pool operations.
///
/// Capacity and stale-ticket refusals are not errors; they come back as
/// [`Admission::Rejected`](crate::Admission::Rejected).
#[derive(Debug, Error)]
pub enum PoolError {
    /// Ticket not in the pool.
    #[error("ticket not found: {0}")]
    NotFound(TicketId),

    /// The requested state change is not allowed.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// The ticket store failed to persist or delete a ticket.
    #[error("ticket store error: {0}")]
    Store(String),

    /// Persisted ticket state could not be read back.
    #[error("corrupt ticket state at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid pool configuration.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// Whether this error means persisted state cannot be trusted.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, PoolError::Corrupt { .. })
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::Store(_) | PoolError::Io(_))
    }
}

/// Failure of a notification side effect.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("notification encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

//! Error types for swen-ledger.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by append-only logs.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Underlying file I/O failed. Transient; callers may retry.
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized.
    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted log does not parse. Fatal at startup.
    #[error("corrupt ledger {path} at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl LedgerError {
    /// Whether the error reflects inconsistent persisted state.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, LedgerError::Corrupt { .. })
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

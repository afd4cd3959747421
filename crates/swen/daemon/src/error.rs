//! Error types for swend.

use thiserror::Error;

/// Daemon errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Engine error
    #[error(transparent)]
    Engine(#[from] swen_engine::EngineError),

    /// Policy error
    #[error(transparent)]
    Policy(#[from] swen_policy::PolicyError),

    /// Pool error
    #[error(transparent)]
    Pool(#[from] swen_pool::PoolError),

    /// Health loop error
    #[error(transparent)]
    Health(#[from] swen_health::HealthError),

    /// Log error
    #[error(transparent)]
    Ledger(#[from] swen_ledger::LedgerError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operator request encoding error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unknown ticket id on the command line
    #[error("invalid ticket id: {0}")]
    InvalidTicketId(String),

    /// Another process owns the state directory
    #[error("state directory lock {} is held by another swend process{}", .path.display(), holder_suffix(.holder))]
    Locked {
        path: std::path::PathBuf,
        holder: Option<u32>,
    },
}

fn holder_suffix(holder: &Option<u32>) -> String {
    holder.map(|pid| format!(" (pid {})", pid)).unwrap_or_default()
}

impl DaemonError {
    /// Persisted state failed to load; startup must stop.
    pub fn is_corrupt(&self) -> bool {
        match self {
            DaemonError::Engine(e) => e.is_corrupt(),
            DaemonError::Pool(e) => e.is_corrupt(),
            DaemonError::Ledger(e) => e.is_corrupt(),
            _ => false,
        }
    }

    /// The state directory is owned by a running daemon.
    pub fn is_locked(&self) -> bool {
        matches!(self, DaemonError::Locked { .. })
    }
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

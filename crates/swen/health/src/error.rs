//! Error types for swen-health.
//!
//! Probe and remediation failures are normally recorded as health events
//! rather than returned; these errors surface from remediators and from
//! building the loop.

use thiserror::Error;

/// Errors that can occur during health checks and remediation.
#[derive(Debug, Error)]
pub enum HealthError {
    /// Remediation action ran and failed.
    #[error("remediation failed for {subsystem}: {reason}")]
    RemediationFailed { subsystem: String, reason: String },

    /// Remediation action could not be started.
    #[error("remediation for {subsystem} could not start: {source}")]
    Spawn {
        subsystem: String,
        #[source]
        source: std::io::Error,
    },

    /// Two subsystems share a name.
    #[error("duplicate subsystem: {0}")]
    DuplicateSubsystem(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Pool operation failed during remediation.
    #[error("pool error: {0}")]
    Pool(#[from] swen_pool::PoolError),

    /// Health log could not be written.
    #[error("health log error: {0}")]
    Ledger(#[from] swen_ledger::LedgerError),
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;

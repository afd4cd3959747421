//! Error types for swen-engine.

use swen_ledger::LedgerError;
use thiserror::Error;

/// Errors raised while configuring the engine or reading telemetry.
///
/// Scoring and deciding never fail; these errors only come from
/// configuration validation, telemetry acquisition and history reload.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Weights fail validation.
    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    /// Other engine configuration is out of range.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Telemetry document is structurally unusable.
    #[error("invalid telemetry: {0}")]
    Telemetry(String),

    /// Telemetry could not be read.
    #[error("telemetry I/O error: {0}")]
    TelemetryIo(#[from] std::io::Error),

    /// Telemetry is not valid JSON.
    #[error("telemetry parse error: {0}")]
    TelemetryParse(#[from] serde_json::Error),

    /// Decision log failure.
    #[error("decision log error: {0}")]
    Ledger(#[from] LedgerError),
}

impl EngineError {
    /// Whether the error reflects corrupt persisted history.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, EngineError::Ledger(e) if e.is_corrupt())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

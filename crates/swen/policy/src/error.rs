//! Error types for swen-policy.
//!
//! Evaluation itself never fails; these errors come from validating rule
//! sets and thresholds when configuration is loaded.

use thiserror::Error;

/// Errors that can occur while building a policy gate.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A threshold is outside its valid range.
    #[error("invalid policy threshold: {0}")]
    InvalidThreshold(String),

    /// A rule is malformed.
    #[error("invalid policy rule {rule}: {reason}")]
    InvalidRule { rule: String, reason: String },

    /// The rule set is empty.
    #[error("policy rule set is empty")]
    EmptyRuleSet,
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

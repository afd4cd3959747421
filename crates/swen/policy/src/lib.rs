//! # SWEN Policy - Admission Control
//!
//! Classifies each [`Decision`](swen_types::Decision) as auto-approve,
//! manual review or block before it may become a change ticket.
//!
//! Rules are data: an ordered [`PolicyRuleSet`] of [`PolicyRule`]s, each a
//! conjunction of [`Condition`]s. The first matching rule decides. The
//! standard set is derived from [`PolicyThresholds`]:
//!
//! | Rule | Outcome |
//! |------|---------|
//! | stateful service | manual review |
//! | cost delta above block threshold, or confidence below block threshold | block |
//! | small delta, high confidence, enough savings, low traffic impact | auto-approve |
//! | otherwise | manual review |
//!
//! ## Example
//!
//! ```rust,no_run
//! use swen_policy::{PolicyGate, PolicyThresholds, ServiceProfile, TicketMetadata};
//! # fn example(decision: swen_types::Decision) {
//! let gate = PolicyGate::from_thresholds(&PolicyThresholds::default()).unwrap();
//! let metadata = TicketMetadata::for_decision(&decision, &ServiceProfile::default());
//! let verdict = gate.evaluate(&decision, &metadata);
//! println!("{}: {}", verdict.outcome, verdict.reason());
//! # }
//! ```

pub mod error;
pub mod gate;
pub mod metadata;
pub mod rules;
pub mod stats;

pub use error::{PolicyError, PolicyResult};
pub use gate::PolicyGate;
pub use metadata::{RiskLevel, ServiceProfile, TicketMetadata};
pub use rules::{Condition, Facts, PolicyRule, PolicyRuleSet, PolicyThresholds};
pub use stats::{PolicyStats, PolicyStatsSnapshot};

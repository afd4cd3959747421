//! # SWEN Types
//!
//! Shared data model for the SWEN placement and change-control pipeline:
//!
//! - [`TelemetrySnapshot`]: immutable per-service, per-provider observations
//! - [`ProviderScore`] and [`Decision`]: scored recommendations
//! - [`Verdict`]: admission-control outcome for a decision
//! - [`ChangeTicket`]: the bounded, mutable unit of pending change
//! - [`HealthEvent`]: append-only supervision record

pub mod decision;
pub mod health;
pub mod ids;
pub mod telemetry;
pub mod ticket;

pub use decision::{Decision, ProviderScore, Verdict, VerdictOutcome};
pub use health::{HealthEvent, HealthStatus, RemediationOutcome};
pub use ids::{DecisionId, SnapshotId, TicketId};
pub use telemetry::{
    Assignment, ProviderMetrics, ServiceTelemetry, TelemetrySnapshot, REQUIRED_METRICS,
};
pub use ticket::{ChangeTicket, InvalidTransition, TicketState};

//! # SWEN Engine - Provider Scoring and Placement Decisions
//!
//! Converts telemetry snapshots into placement decisions:
//!
//! - [`scoring`]: normalize raw metrics and weight them into a [`ProviderScore`](swen_types::ProviderScore)
//! - [`confidence`]: blend score separation with data completeness
//! - [`DecisionMaker`]: pick the best provider per service, apply the emission
//!   rule, and remember results per `(service, snapshot)`
//! - [`SnapshotCell`]: publish the latest snapshot by pointer swap
//! - [`telemetry`]: read snapshots from the external feed
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swen_engine::{DecisionMaker, EngineConfig};
//! use swen_ledger::MemoryLog;
//! use swen_types::{Assignment, Decision, TelemetrySnapshot};
//!
//! # async fn example(snapshot: TelemetrySnapshot) {
//! let config = EngineConfig::default();
//! config.validate().unwrap();
//!
//! let maker = DecisionMaker::new(config, Arc::new(MemoryLog::<Decision>::new()));
//! if let Some(decision) = maker.decide(&snapshot, &Assignment::new("api", "aws")).await {
//!     println!("{}", decision.explanation);
//! }
//! # }
//! ```

pub mod confidence;
pub mod config;
pub mod error;
pub mod maker;
pub mod scoring;
pub mod snapshot;
pub mod telemetry;

pub use confidence::confidence;
pub use config::{EngineConfig, NormalizationCaps, WeightConfig};
pub use error::{EngineError, EngineResult};
pub use maker::{DecisionKey, DecisionMaker, Evaluation};
pub use scoring::{normalize_higher_better, normalize_lower_better, score, Scorer};
pub use snapshot::SnapshotCell;
pub use telemetry::{parse_snapshot, FileTelemetrySource, StaticTelemetrySource, TelemetrySource};

//! # SWEN Health
//!
//! Periodic supervision of the subsystems SWEN depends on: the telemetry
//! feed, the engine, the ticket pool and anything else configured. Each
//! cycle probes every subsystem; degraded ones with a configured remediation
//! get a bounded number of attempts, and recovery is confirmed by a second
//! probe. Every observation and outcome lands in an append-only health log.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swen_health::{HealthLoop, HealthLoopConfig, PoolProbe, PoolRemediator, Subsystem};
//! use swen_ledger::MemoryLog;
//! use swen_pool::{ChangeTicketPool, InMemoryTicketStore, PoolConfig};
//! use swen_types::HealthEvent;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Arc::new(ChangeTicketPool::new(
//!     PoolConfig::default(),
//!     Arc::new(InMemoryTicketStore::new()),
//! ));
//! let log = Arc::new(MemoryLog::<HealthEvent>::new());
//!
//! let mut health = HealthLoop::new(HealthLoopConfig::default(), log)?;
//! health.register(
//!     Subsystem::new("pool", Arc::new(PoolProbe::new(pool.clone())))
//!         .with_remediator(Arc::new(PoolRemediator::new(pool))),
//! )?;
//!
//! let report = health.run_once().await;
//! println!("healthy: {}", report.all_healthy());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod monitor;
pub mod probes;
pub mod remediation;

pub use config::{HealthLoopConfig, ProbeConfig, RemediationConfig, SubsystemConfig};
pub use error::{HealthError, HealthResult};
pub use monitor::{
    CycleReport, HealthLoop, HealthSummary, Subsystem, SubsystemReport, SubsystemState,
    SubsystemStatus,
};
pub use probes::{FileFreshnessProbe, FnProbe, HttpProbe, PoolProbe, Probe, ProbeResult};
pub use remediation::{CommandRemediator, PoolRemediator, Remediator};

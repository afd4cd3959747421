//! Read-only view of a state directory.
//!
//! `status`, `tickets list` and `check-health` must work while a daemon
//! owns the directory, so they neither take the lock nor write anything:
//! no restore, no eviction, no log repair. Health probes are recorded in
//! memory only.

use std::sync::Arc;

use swen_health::{HealthLoop, PoolProbe, Subsystem};
use swen_ledger::{read_tail, MemoryLog};
use swen_pool::{ChangeTicketPool, FileTicketStore, InMemoryTicketStore, TicketStore};
use swen_types::HealthEvent;

use crate::config::SwenConfig;
use crate::control::{ControlInbox, ControlRequest};
use crate::error::DaemonResult;
use crate::runtime::POOL_SUBSYSTEM;

/// Snapshot of persisted state, loaded without ownership.
pub struct StateView {
    pub config: SwenConfig,
    pub pool: Arc<ChangeTicketPool>,
}

impl StateView {
    pub async fn open(config: SwenConfig) -> DaemonResult<Self> {
        let tickets_dir = config.paths.tickets_dir();
        let store: Arc<dyn TicketStore> = if tokio::fs::try_exists(&tickets_dir).await? {
            Arc::new(FileTicketStore::open(tickets_dir).await?)
        } else {
            Arc::new(InMemoryTicketStore::new())
        };

        let pool = Arc::new(ChangeTicketPool::new(config.pool.clone(), store));
        pool.load_view().await?;
        Ok(Self { config, pool })
    }

    /// Newest health events first.
    pub async fn recent_health(&self, limit: usize) -> DaemonResult<Vec<HealthEvent>> {
        Ok(read_tail(&self.config.paths.health_log(), limit).await?)
    }

    /// Operator requests waiting for the daemon.
    pub async fn pending_requests(&self) -> DaemonResult<Vec<ControlRequest>> {
        ControlInbox::new(self.config.paths.control_dir()).pending().await
    }

    /// A health loop over this view whose events stay in memory.
    pub fn health(&self) -> DaemonResult<HealthLoop> {
        let mut health = HealthLoop::new(
            self.config.health.clone(),
            Arc::new(MemoryLog::<HealthEvent>::new()),
        )?;
        health.register(Subsystem::new(
            POOL_SUBSYSTEM,
            Arc::new(PoolProbe::new(self.pool.clone())),
        ))?;
        Ok(health)
    }
}

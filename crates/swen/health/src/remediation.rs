//! Remediation actions.
//!
//! Remediations must be idempotent: the loop may run the same action again
//! on the next cycle if the subsystem is still degraded.

use std::sync::Arc;

use async_trait::async_trait;
use swen_pool::ChangeTicketPool;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{HealthError, HealthResult};

/// A corrective action for one subsystem.
#[async_trait]
pub trait Remediator: Send + Sync {
    /// Human-readable action, recorded on health events.
    fn action(&self) -> String;

    /// Run the action. Returns a short detail on success.
    async fn remediate(&self) -> HealthResult<String>;
}

/// Runs an external command, e.g. a service restart.
///
/// The child is not killed if the loop stops waiting for it.
pub struct CommandRemediator {
    subsystem: String,
    program: String,
    args: Vec<String>,
}

impl CommandRemediator {
    pub fn new(subsystem: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            subsystem: subsystem.into(),
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Remediator for CommandRemediator {
    fn action(&self) -> String {
        if self.args.is_empty() {
            format!("run {}", self.program)
        } else {
            format!("run {} {}", self.program, self.args.join(" "))
        }
    }

    async fn remediate(&self) -> HealthResult<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(false)
            .output()
            .await
            .map_err(|source| HealthError::Spawn {
                subsystem: self.subsystem.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(format!("{} exited successfully", self.program))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(HealthError::RemediationFailed {
                subsystem: self.subsystem.clone(),
                reason: format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            })
        }
    }
}

/// Brings the ticket pool back within its bound and expires stale tickets
/// unless `evict_stale_on_heal` is off.
pub struct PoolRemediator {
    pool: Arc<ChangeTicketPool>,
}

impl PoolRemediator {
    pub fn new(pool: Arc<ChangeTicketPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Remediator for PoolRemediator {
    fn action(&self) -> String {
        if self.pool.config().evict_stale_on_heal {
            "enforce pool limit and evict stale tickets".to_string()
        } else {
            "enforce pool limit".to_string()
        }
    }

    async fn remediate(&self) -> HealthResult<String> {
        let evicted = self.pool.enforce_limit().await?;
        let mut detail = format!("evicted {} tickets over limit", evicted.len());

        if self.pool.config().evict_stale_on_heal {
            let stale = self.pool.evict_stale().await?;
            detail.push_str(&format!(", {} stale tickets", stale.len()));
        } else {
            let stale = self.pool.stale_tickets().len();
            if stale > 0 {
                warn!(stale = stale, "Stale tickets need operator resolution");
            }
        }

        info!(detail = %detail, "Pool remediation finished");
        Ok(detail)
    }
}

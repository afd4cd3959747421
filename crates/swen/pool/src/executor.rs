//! Change executor boundary.
//!
//! Approved tickets are handed to a [`ChangeExecutor`] through the pool's
//! approval channel. The worker moves each ticket to `Applying`, runs the
//! executor and reports the outcome back, which drives
//! `Applying -> Applied | Failed`. Tickets restored in `Applying` were
//! interrupted mid-apply and are applied again, so executors must tolerate
//! seeing the same change twice.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use swen_types::{ChangeTicket, TicketState};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::pool::ChangeTicketPool;

/// Result reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Success,
    Failure(String),
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ApplyOutcome::Success)
    }
}

/// Applies an approved infrastructure change.
#[async_trait]
pub trait ChangeExecutor: Send + Sync {
    async fn apply(&self, ticket: &ChangeTicket) -> ApplyOutcome;
}

/// Executor that only logs the change and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExecutor;

#[async_trait]
impl ChangeExecutor for LoggingExecutor {
    async fn apply(&self, ticket: &ChangeTicket) -> ApplyOutcome {
        info!(
            ticket_id = %ticket.id,
            service = %ticket.service,
            from = %ticket.from_provider,
            to = %ticket.to_provider,
            "Applying change (dry run)"
        );
        ApplyOutcome::Success
    }
}

/// Consumes approved tickets and drives them through the executor.
pub struct ExecutorWorker;

impl ExecutorWorker {
    /// Register on the pool's approval channel and process tickets until
    /// the channel is detached, the pool is dropped or the task is aborted.
    pub fn spawn(pool: Arc<ChangeTicketPool>, executor: Arc<dyn ChangeExecutor>) -> JoinHandle<()> {
        let mut approved_rx = pool.on_approved();
        let weak_pool = Arc::downgrade(&pool);

        tokio::spawn(async move {
            while let Some(ticket) = approved_rx.recv().await {
                let Some(pool) = weak_pool.upgrade() else {
                    break;
                };
                let ticket = match pool.get(&ticket.id) {
                    Some(current) if current.state == TicketState::Applying => {
                        info!(ticket_id = %current.id, "Resuming interrupted apply");
                        current
                    }
                    _ => match pool.begin_apply(&ticket.id).await {
                        Ok(t) => t,
                        Err(e) => {
                            warn!(ticket_id = %ticket.id, error = %e, "Skipping approved ticket");
                            continue;
                        }
                    },
                };

                let outcome = executor.apply(&ticket).await;
                if let Err(e) = pool.report_outcome(&ticket.id, outcome).await {
                    error!(ticket_id = %ticket.id, error = %e, "Failed to record apply outcome");
                }
            }
        })
    }

    /// Stop feeding the worker and let it finish what it already received.
    /// A worker still busy after `timeout` is aborted; its tickets stay
    /// `Applying` and are sent again on the next restore.
    pub async fn drain(pool: &ChangeTicketPool, mut handle: JoinHandle<()>, timeout: Duration) -> bool {
        pool.detach_executor();
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Executor still busy at shutdown; aborting");
                handle.abort();
                false
            }
        }
    }
}

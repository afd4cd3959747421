//! Ticket-creation side effects.
//!
//! Creating a ticket publishes a change proposal for reviewers. The
//! proposal is delivered in the background: a failure never undoes the
//! ticket, it is retried with bounded exponential backoff and, once the
//! attempts are exhausted, recorded as a health event for the
//! `notifications` subsystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swen_ledger::AppendLog;
use swen_types::{ChangeTicket, HealthEvent, HealthStatus, RemediationOutcome, TicketId};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BackoffConfig;
use crate::error::NotifyError;

/// Subsystem name used for notification health events.
pub const NOTIFICATIONS_SUBSYSTEM: &str = "notifications";

/// Delivers a proposal for a newly created ticket.
#[async_trait]
pub trait TicketNotifier: Send + Sync {
    async fn notify(&self, ticket: &ChangeTicket) -> Result<(), NotifyError>;

    /// Whether the proposal for `ticket` was already delivered.
    async fn delivered(&self, ticket: &ChangeTicket) -> Result<bool, NotifyError>;

    fn name(&self) -> &str {
        "notifier"
    }
}

/// Proposal document written for reviewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeProposal {
    pub ticket_id: TicketId,
    pub title: String,
    pub service: String,
    pub from_provider: String,
    pub to_provider: String,
    pub predicted_monthly_savings: f64,
    pub verdict: String,
    pub reasons: Vec<String>,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ChangeProposal {
    pub fn from_ticket(ticket: &ChangeTicket) -> Self {
        Self {
            ticket_id: ticket.id.clone(),
            title: format!(
                "SWEN recommendation: move {} from {} to {}",
                ticket.service, ticket.from_provider, ticket.to_provider
            ),
            service: ticket.service.clone(),
            from_provider: ticket.from_provider.clone(),
            to_provider: ticket.to_provider.clone(),
            predicted_monthly_savings: ticket.predicted_monthly_savings,
            verdict: ticket.verdict.outcome.to_string(),
            reasons: ticket.verdict.reasons.clone(),
            labels: vec![
                "swen-generated".to_string(),
                "infrastructure".to_string(),
                "cost-optimization".to_string(),
            ],
            created_at: ticket.created_at,
        }
    }
}

/// Writes one proposal file per ticket into an outbox directory.
pub struct FileProposalNotifier {
    outbox: PathBuf,
}

impl FileProposalNotifier {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
        }
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    pub fn proposal_path(&self, ticket: &ChangeTicket) -> PathBuf {
        self.outbox
            .join(format!("{}-{}.json", ticket.service, ticket.id.as_uuid()))
    }
}

#[async_trait]
impl TicketNotifier for FileProposalNotifier {
    async fn notify(&self, ticket: &ChangeTicket) -> Result<(), NotifyError> {
        tokio::fs::create_dir_all(&self.outbox).await?;

        let path = self.proposal_path(ticket);
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(&ChangeProposal::from_ticket(ticket))?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(ticket_id = %ticket.id, path = %path.display(), "Wrote change proposal");
        Ok(())
    }

    async fn delivered(&self, ticket: &ChangeTicket) -> Result<bool, NotifyError> {
        Ok(tokio::fs::try_exists(self.proposal_path(ticket)).await?)
    }

    fn name(&self) -> &str {
        "file-proposal"
    }
}

/// Runs notifications in the background with retry.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn TicketNotifier>,
    backoff: BackoffConfig,
    health_log: Option<Arc<dyn AppendLog<HealthEvent>>>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn TicketNotifier>, backoff: BackoffConfig) -> Self {
        Self {
            notifier,
            backoff,
            health_log: None,
        }
    }

    /// Record exhausted retries in this log.
    pub fn with_health_log(mut self, log: Arc<dyn AppendLog<HealthEvent>>) -> Self {
        self.health_log = Some(log);
        self
    }

    /// Deliver in the background. The handle resolves to whether delivery
    /// eventually succeeded.
    pub fn dispatch(&self, ticket: ChangeTicket) -> JoinHandle<bool> {
        let this = self.clone();
        tokio::spawn(async move { this.deliver(&ticket).await })
    }

    /// Send again every proposal the notifier has no record of, e.g. after
    /// a shutdown during backoff. Returns one handle per re-sent ticket.
    pub async fn redeliver_missing(&self, tickets: &[ChangeTicket]) -> Vec<JoinHandle<bool>> {
        let mut handles = Vec::new();
        for ticket in tickets {
            match self.notifier.delivered(ticket).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(ticket_id = %ticket.id, service = %ticket.service, "Re-sending undelivered proposal");
                    handles.push(self.dispatch(ticket.clone()));
                }
                Err(e) => {
                    warn!(ticket_id = %ticket.id, error = %e, "Could not check proposal delivery");
                }
            }
        }
        handles
    }

    /// Deliver with retries on the current task.
    pub async fn deliver(&self, ticket: &ChangeTicket) -> bool {
        let max_attempts = self.backoff.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.backoff.delay_for(attempt - 1)).await;
            }

            match self.notifier.notify(ticket).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(
                            ticket_id = %ticket.id,
                            attempt = attempt,
                            notifier = self.notifier.name(),
                            "Notification delivered after retry"
                        );
                    }
                    return true;
                }
                Err(e) => {
                    warn!(
                        ticket_id = %ticket.id,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Notification failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        let event = HealthEvent::remediation(
            NOTIFICATIONS_SUBSYSTEM,
            HealthStatus::Degraded,
            format!("notify {} via {}", ticket.id, self.notifier.name()),
            RemediationOutcome::Failure,
            format!(
                "gave up after {} attempts: {}",
                max_attempts, last_error
            ),
        );
        error!(
            ticket_id = %ticket.id,
            service = %ticket.service,
            error = %last_error,
            "Notification retries exhausted; ticket stays pending locally"
        );

        if let Some(log) = &self.health_log {
            if let Err(e) = log.append(&event).await {
                error!(error = %e, "Failed to record notification health event");
            }
        }

        false
    }
}

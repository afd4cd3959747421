//! The decision cycle: telemetry → decision → policy → ticket.
//!
//! A decision is committed to the decision log only after its outcome is
//! settled: blocked, dropped, or its ticket stored. A crash before that
//! point leaves neither record and the decision is made again on restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use swen_engine::{DecisionMaker, Evaluation, SnapshotCell, TelemetrySource};
use swen_policy::{PolicyGate, PolicyStatsSnapshot, ServiceProfile, TicketMetadata};
use swen_pool::{Admission, ChangeTicketPool};
use swen_types::{ChangeTicket, SnapshotId, TicketId, TicketState, VerdictOutcome};
use tracing::{debug, info, instrument, warn};

use crate::error::DaemonResult;

/// A ticket opened during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenedTicket {
    pub service: String,
    pub ticket_id: TicketId,
    pub verdict: VerdictOutcome,
    pub state: TicketState,
}

/// A decision that did not become a ticket, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    pub service: String,
    pub reason: String,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleSummary {
    pub snapshot_id: Option<SnapshotId>,
    pub evaluated: usize,
    pub replayed: usize,
    pub opened: Vec<OpenedTicket>,
    pub blocked: Vec<Skipped>,
    pub dropped: Vec<Skipped>,

    /// Running verdict totals after this cycle.
    pub policy: PolicyStatsSnapshot,
}

/// Runs decision cycles against the shared pool.
pub struct DecisionCycle {
    telemetry: Arc<dyn TelemetrySource>,
    snapshots: SnapshotCell,
    maker: Arc<DecisionMaker>,
    gate: Arc<PolicyGate>,
    pool: Arc<ChangeTicketPool>,
    services: BTreeMap<String, ServiceProfile>,
}

impl DecisionCycle {
    pub fn new(
        telemetry: Arc<dyn TelemetrySource>,
        maker: Arc<DecisionMaker>,
        gate: Arc<PolicyGate>,
        pool: Arc<ChangeTicketPool>,
        services: BTreeMap<String, ServiceProfile>,
    ) -> Self {
        Self {
            telemetry,
            snapshots: SnapshotCell::new(),
            maker,
            gate,
            pool,
            services,
        }
    }

    pub fn gate(&self) -> &PolicyGate {
        &self.gate
    }

    pub fn snapshots(&self) -> &SnapshotCell {
        &self.snapshots
    }

    pub fn maker(&self) -> &DecisionMaker {
        &self.maker
    }

    /// Read the latest snapshot and act on every service it reports.
    ///
    /// Only telemetry acquisition and pool storage failures are errors.
    /// Dropped and blocked decisions are part of the summary.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> DaemonResult<CycleSummary> {
        let snapshot = self.telemetry.read_snapshot().await?;
        self.snapshots.publish(snapshot);
        let Some(snapshot) = self.snapshots.load() else {
            return Ok(CycleSummary::default());
        };

        let mut summary = CycleSummary {
            snapshot_id: Some(snapshot.id.clone()),
            ..Default::default()
        };

        for assignment in snapshot.assignments() {
            summary.evaluated += 1;

            let decision = match self.maker.evaluate(&snapshot, &assignment).await {
                Evaluation::Emitted(decision) => decision,
                Evaluation::Replayed(_) => {
                    debug!(service = %assignment.service, "Snapshot already processed");
                    summary.replayed += 1;
                    continue;
                }
                Evaluation::Dropped { service, reason } => {
                    debug!(service = %service, reason = %reason, "No actionable decision");
                    summary.dropped.push(Skipped { service, reason });
                    continue;
                }
            };

            let profile = self
                .services
                .get(&decision.service)
                .cloned()
                .unwrap_or_default();
            let metadata = TicketMetadata::for_decision(&decision, &profile);
            let verdict = self.gate.admit(&decision, &metadata);

            if verdict.is_blocked() {
                warn!(
                    service = %decision.service,
                    decision_id = %decision.id,
                    reason = %verdict.reason(),
                    "Decision blocked by policy"
                );
                self.maker.commit(&decision).await;
                summary.blocked.push(Skipped {
                    service: decision.service.clone(),
                    reason: verdict.reason(),
                });
                continue;
            }

            let (allowed, reason) = self.pool.can_create(&decision.service);
            if !allowed {
                warn!(
                    service = %decision.service,
                    decision_id = %decision.id,
                    reason = %reason,
                    "Decision dropped"
                );
                self.maker.commit(&decision).await;
                summary.dropped.push(Skipped {
                    service: decision.service.clone(),
                    reason,
                });
                continue;
            }

            let outcome = verdict.outcome;
            let ticket = ChangeTicket::from_decision(&decision, verdict);
            let admission = match self.pool.create(ticket).await {
                Ok(admission) => admission,
                Err(e) => {
                    // Nothing was stored; the next cycle decides again.
                    self.maker.forget(&decision.service, &decision.snapshot_id);
                    return Err(e.into());
                }
            };

            // The ticket is durable before the decision is logged. A crash in
            // between is repaired at startup from the ticket's snapshot id.
            self.maker.commit(&decision).await;

            match admission {
                Admission::Created(ticket) => {
                    let routed = self.pool.route(&ticket.id).await?;
                    summary.opened.push(OpenedTicket {
                        service: routed.service.clone(),
                        ticket_id: routed.id.clone(),
                        verdict: outcome,
                        state: routed.state,
                    });
                }
                Admission::Rejected { reason } => {
                    summary.dropped.push(Skipped {
                        service: decision.service.clone(),
                        reason,
                    });
                }
            }
        }

        summary.policy = self.gate.stats().snapshot();
        info!(
            snapshot_id = %snapshot.id,
            evaluated = summary.evaluated,
            opened = summary.opened.len(),
            blocked = summary.blocked.len(),
            dropped = summary.dropped.len(),
            auto_approved_total = summary.policy.auto_approved,
            "Decision cycle finished"
        );
        Ok(summary)
    }
}

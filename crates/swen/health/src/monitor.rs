//! The health and remediation loop.
//!
//! Each cycle probes every registered subsystem. Degraded subsystems with a
//! remediator get up to `max_attempts` attempts, each bounded by a timeout,
//! and recovery is confirmed by probing again. Cycles never overlap: a cycle
//! that finds a remediation from an earlier cycle still running is skipped.
//!
//! Every probe and every remediation outcome is appended to the health log.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use swen_ledger::AppendLog;
use swen_types::{HealthEvent, HealthStatus, RemediationOutcome};
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::config::HealthLoopConfig;
use crate::error::{HealthError, HealthResult};
use crate::probes::{Probe, ProbeResult};
use crate::remediation::Remediator;

/// A managed subsystem: a probe and an optional remediation.
#[derive(Clone)]
pub struct Subsystem {
    name: String,
    probe: Arc<dyn Probe>,
    remediator: Option<Arc<dyn Remediator>>,
}

impl Subsystem {
    pub fn new(name: impl Into<String>, probe: Arc<dyn Probe>) -> Self {
        Self {
            name: name.into(),
            probe,
            remediator: None,
        }
    }

    pub fn with_remediator(mut self, remediator: Arc<dyn Remediator>) -> Self {
        self.remediator = Some(remediator);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Health state of one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemState {
    Healthy,
    Degraded,
    Remediating,
}

impl std::fmt::Display for SubsystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubsystemState::Healthy => write!(f, "healthy"),
            SubsystemState::Degraded => write!(f, "degraded"),
            SubsystemState::Remediating => write!(f, "remediating"),
        }
    }
}

/// Current view of one subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemStatus {
    pub name: String,
    pub probe: String,
    pub state: SubsystemState,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_message: Option<String>,
    pub consecutive_failures: u32,
    pub last_remediation: Option<RemediationOutcome>,
    pub remediation_in_flight: bool,
}

/// Result of one subsystem within a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemReport {
    pub name: String,
    pub status: HealthStatus,
    pub remediation: Option<RemediationOutcome>,
    pub attempts: u32,
}

/// Result of one loop cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub subsystems: Vec<SubsystemReport>,
}

impl CycleReport {
    fn skipped(started_at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            started_at,
            skipped: true,
            skip_reason: Some(reason.into()),
            subsystems: Vec::new(),
        }
    }

    /// Whether every subsystem ended the cycle healthy.
    pub fn all_healthy(&self) -> bool {
        !self.skipped && self.subsystems.iter().all(|s| s.status.is_healthy())
    }
}

/// Probe-only pass over all subsystems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub checked_at: DateTime<Utc>,
    pub overall: HealthStatus,
    pub subsystems: Vec<(String, ProbeResult)>,
}

/// A remediation that outlived its attempt timeout.
struct LateRemediation {
    action: String,
    handle: JoinHandle<HealthResult<String>>,
}

/// Periodic supervisor for managed subsystems.
pub struct HealthLoop {
    config: HealthLoopConfig,
    subsystems: Vec<Subsystem>,
    states: DashMap<String, SubsystemStatus>,

    /// Remediations that outlived their attempt timeout.
    in_flight: DashMap<String, LateRemediation>,

    cycle: Mutex<()>,
    log: Arc<dyn AppendLog<HealthEvent>>,
    event_tx: broadcast::Sender<HealthEvent>,
    running: RwLock<bool>,
    shutdown: Notify,
}

impl HealthLoop {
    /// Create a loop with the subsystems listed in `config`.
    pub fn new(config: HealthLoopConfig, log: Arc<dyn AppendLog<HealthEvent>>) -> HealthResult<Self> {
        let (event_tx, _) = broadcast::channel(256);
        let mut this = Self {
            config,
            subsystems: Vec::new(),
            states: DashMap::new(),
            in_flight: DashMap::new(),
            cycle: Mutex::new(()),
            log,
            event_tx,
            running: RwLock::new(false),
            shutdown: Notify::new(),
        };

        let timeout = this.config.attempt_timeout();
        let configured: Vec<Subsystem> = this
            .config
            .subsystems
            .iter()
            .map(|s| s.build(timeout))
            .collect();
        for subsystem in configured {
            this.register(subsystem)?;
        }
        Ok(this)
    }

    /// Add a subsystem. Names must be unique.
    pub fn register(&mut self, subsystem: Subsystem) -> HealthResult<()> {
        if self.states.contains_key(&subsystem.name) {
            return Err(HealthError::DuplicateSubsystem(subsystem.name));
        }
        self.states.insert(
            subsystem.name.clone(),
            SubsystemStatus {
                name: subsystem.name.clone(),
                probe: subsystem.probe.describe(),
                state: SubsystemState::Healthy,
                last_checked: None,
                last_message: None,
                consecutive_failures: 0,
                last_remediation: None,
                remediation_in_flight: false,
            },
        );
        debug!(subsystem = %subsystem.name, "Registered subsystem");
        self.subsystems.push(subsystem);
        Ok(())
    }

    pub fn config(&self) -> &HealthLoopConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.event_tx.subscribe()
    }

    /// Current state of every subsystem, by name.
    pub fn status(&self) -> Vec<SubsystemStatus> {
        let mut statuses: Vec<SubsystemStatus> = self
            .states
            .iter()
            .map(|entry| {
                let mut s = entry.value().clone();
                s.remediation_in_flight = self.in_flight.contains_key(entry.key());
                s
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Probe every subsystem once without remediating.
    #[instrument(skip(self))]
    pub async fn check_health(&self) -> HealthSummary {
        let results = join_all(self.subsystems.iter().map(|s| async move {
            (s.name.clone(), self.probe_subsystem(s).await)
        }))
        .await;

        let overall = if results.iter().all(|(_, r)| r.is_healthy()) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthSummary {
            checked_at: Utc::now(),
            overall,
            subsystems: results,
        }
    }

    /// Run a single probe-and-remediate pass.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> CycleReport {
        let started_at = Utc::now();

        let Ok(_guard) = self.cycle.try_lock() else {
            warn!("Health cycle skipped: previous cycle still running");
            return CycleReport::skipped(started_at, "previous cycle still running");
        };

        let lingering = self.reap_in_flight().await;
        if !lingering.is_empty() {
            warn!(
                subsystems = %lingering.join(", "),
                "Health cycle skipped: remediation from an earlier cycle still running"
            );
            for name in &lingering {
                self.record(HealthEvent::remediation(
                    name.clone(),
                    HealthStatus::Degraded,
                    "cycle skipped",
                    RemediationOutcome::Skipped,
                    "previous remediation still running",
                ))
                .await;
            }
            return CycleReport::skipped(
                started_at,
                format!("remediation still running for {}", lingering.join(", ")),
            );
        }

        let subsystems = join_all(self.subsystems.iter().map(|s| self.check_and_heal(s))).await;

        CycleReport {
            started_at,
            skipped: false,
            skip_reason: None,
            subsystems,
        }
    }

    /// Run cycles every `interval` until [`HealthLoop::stop`] is called.
    pub async fn run_continuous(&self, interval: Duration) {
        *self.running.write().await = true;
        info!(interval_secs = interval.as_secs(), "Health loop started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.notified() => break,
            }

            if !*self.running.read().await {
                break;
            }

            let report = self.run_once().await;
            if !report.skipped {
                let degraded = report
                    .subsystems
                    .iter()
                    .filter(|s| !s.status.is_healthy())
                    .count();
                debug!(
                    subsystems = report.subsystems.len(),
                    degraded = degraded,
                    "Health cycle finished"
                );
            }
        }

        info!("Health loop stopped");
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.shutdown.notify_one();
    }

    async fn check_and_heal(&self, subsystem: &Subsystem) -> SubsystemReport {
        let name = subsystem.name.clone();
        let first = self.probe_subsystem(subsystem).await;
        if first.is_healthy() {
            return SubsystemReport {
                name,
                status: HealthStatus::Healthy,
                remediation: None,
                attempts: 0,
            };
        }

        let Some(remediator) = subsystem.remediator.clone() else {
            warn!(
                subsystem = %name,
                message = first.message.as_deref().unwrap_or(""),
                "Subsystem degraded; no remediation configured"
            );
            return SubsystemReport {
                name,
                status: HealthStatus::Degraded,
                remediation: None,
                attempts: 0,
            };
        };

        self.set_state(&name, SubsystemState::Remediating, None);
        let action = remediator.action();
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = self.config.attempt_timeout();
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            info!(subsystem = %name, action = %action, attempt = attempt, "Starting remediation");

            let task = remediator.clone();
            let mut handle = tokio::spawn(async move { task.remediate().await });

            let failure = match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(Ok(detail))) => {
                    let confirm = self.probe_subsystem(subsystem).await;
                    if confirm.is_healthy() {
                        info!(subsystem = %name, attempt = attempt, "Subsystem recovered");
                        self.record(HealthEvent::remediation(
                            name.clone(),
                            HealthStatus::Healthy,
                            action.clone(),
                            RemediationOutcome::Success,
                            detail,
                        ))
                        .await;
                        self.set_state(&name, SubsystemState::Healthy, Some(RemediationOutcome::Success));
                        return SubsystemReport {
                            name,
                            status: HealthStatus::Healthy,
                            remediation: Some(RemediationOutcome::Success),
                            attempts,
                        };
                    }
                    format!(
                        "still degraded after remediation: {}",
                        confirm.message.unwrap_or_default()
                    )
                }
                Ok(Ok(Err(e))) => e.to_string(),
                Ok(Err(join_err)) => format!("remediation task failed: {}", join_err),
                Err(_) => {
                    let reason = format!(
                        "timed out after {}s; left running and retried next cycle",
                        timeout.as_secs()
                    );
                    self.in_flight.insert(
                        name.clone(),
                        LateRemediation {
                            action: action.clone(),
                            handle,
                        },
                    );
                    self.record_failure(&name, &action, attempt, reason).await;
                    break;
                }
            };

            self.record_failure(&name, &action, attempt, failure).await;
        }

        self.set_state(&name, SubsystemState::Degraded, Some(RemediationOutcome::Failure));
        SubsystemReport {
            name,
            status: HealthStatus::Degraded,
            remediation: Some(RemediationOutcome::Failure),
            attempts,
        }
    }

    async fn probe_subsystem(&self, subsystem: &Subsystem) -> ProbeResult {
        let timeout = self.config.attempt_timeout();
        let result = match tokio::time::timeout(timeout, subsystem.probe.probe()).await {
            Ok(result) => result,
            Err(_) => ProbeResult::timeout(timeout.as_millis() as u64),
        };

        if let Some(mut status) = self.states.get_mut(&subsystem.name) {
            status.last_checked = Some(result.timestamp);
            status.last_message = result.message.clone();
            if result.is_healthy() {
                status.consecutive_failures = 0;
                if status.state == SubsystemState::Degraded {
                    status.state = SubsystemState::Healthy;
                }
            } else {
                status.consecutive_failures += 1;
                if status.state == SubsystemState::Healthy {
                    status.state = SubsystemState::Degraded;
                }
            }
        }

        if !result.is_healthy() {
            warn!(
                subsystem = %subsystem.name,
                message = result.message.as_deref().unwrap_or(""),
                "Probe reports degraded"
            );
        }

        self.record(HealthEvent::probe(
            subsystem.name.clone(),
            result.status,
            result.message.clone(),
        ))
        .await;
        result
    }

    /// Settle finished late remediations; return names still running.
    ///
    /// A late result is confirmed by probing again and recorded like any
    /// other remediation outcome.
    async fn reap_in_flight(&self) -> Vec<String> {
        let finished: Vec<String> = self
            .in_flight
            .iter()
            .filter(|entry| entry.value().handle.is_finished())
            .map(|entry| entry.key().clone())
            .collect();

        for name in finished {
            let Some((_, late)) = self.in_flight.remove(&name) else {
                continue;
            };
            let result = match late.handle.await {
                Ok(Ok(detail)) => Ok(detail),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("remediation task failed: {}", e)),
            };
            self.settle_late(&name, &late.action, result).await;
        }

        let mut running: Vec<String> = self.in_flight.iter().map(|e| e.key().clone()).collect();
        running.sort();
        running
    }

    async fn settle_late(&self, name: &str, action: &str, result: Result<String, String>) {
        let Some(subsystem) = self.subsystems.iter().find(|s| s.name == name) else {
            return;
        };

        let reason = match result {
            Ok(detail) => {
                let confirm = self.probe_subsystem(subsystem).await;
                if confirm.is_healthy() {
                    info!(subsystem = %name, detail = %detail, "Late remediation recovered subsystem");
                    self.record(HealthEvent::remediation(
                        name,
                        HealthStatus::Healthy,
                        action,
                        RemediationOutcome::Success,
                        format!("finished after timeout: {}", detail),
                    ))
                    .await;
                    self.set_state(name, SubsystemState::Healthy, Some(RemediationOutcome::Success));
                    return;
                }
                format!(
                    "finished after timeout, still degraded: {}",
                    confirm.message.unwrap_or_default()
                )
            }
            Err(e) => format!("finished after timeout with error: {}", e),
        };

        warn!(subsystem = %name, reason = %reason, "Late remediation did not recover subsystem");
        self.record(HealthEvent::remediation(
            name,
            HealthStatus::Degraded,
            action,
            RemediationOutcome::Failure,
            reason,
        ))
        .await;
        self.set_state(name, SubsystemState::Degraded, Some(RemediationOutcome::Failure));
    }

    async fn record_failure(&self, name: &str, action: &str, attempt: u32, reason: String) {
        warn!(subsystem = %name, attempt = attempt, reason = %reason, "Remediation attempt failed");
        self.record(HealthEvent::remediation(
            name,
            HealthStatus::Degraded,
            action,
            RemediationOutcome::Failure,
            reason,
        ))
        .await;
    }

    fn set_state(&self, name: &str, state: SubsystemState, outcome: Option<RemediationOutcome>) {
        if let Some(mut status) = self.states.get_mut(name) {
            status.state = state;
            if outcome.is_some() {
                status.last_remediation = outcome;
            }
        }
    }

    async fn record(&self, event: HealthEvent) {
        if let Err(e) = self.log.append(&event).await {
            error!(subsystem = %event.subsystem, error = %e, "Failed to append health event");
        }
        let _ = self.event_tx.send(event);
    }
}

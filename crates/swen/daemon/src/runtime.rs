//! Component wiring.
//!
//! Opening the runtime takes the state directory lock, then loads every
//! piece of persisted state: the ticket store, the decision log, the ticket
//! history and the health log. The decision log and ticket history failing
//! to parse is returned as a corrupt-state error and the daemon does not
//! start; unreadable health events are skipped.
//!
//! Decisions whose ticket was stored but whose log entry was lost in a
//! crash are recovered from the tickets themselves, so the snapshot that
//! produced them is never turned into a second ticket.

use std::sync::Arc;

use swen_engine::{DecisionKey, DecisionMaker, FileTelemetrySource, TelemetrySource};
use swen_health::{HealthLoop, PoolProbe, PoolRemediator, Subsystem};
use swen_ledger::{AppendLog, FileLog};
use swen_pool::{
    ChangeExecutor, ChangeTicketPool, ExecutorWorker, FileProposalNotifier, FileTicketStore,
    NotificationDispatcher, RestoreReport,
};
use swen_types::{ChangeTicket, Decision, HealthEvent};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SwenConfig;
use crate::control::{ControlInbox, ControlOutcome};
use crate::cycle::DecisionCycle;
use crate::error::DaemonResult;
use crate::lock::StateLock;

/// Name of the built-in pool subsystem in the health loop.
pub const POOL_SUBSYSTEM: &str = "pool";

/// All long-lived components of one swend process.
pub struct Runtime {
    pub config: SwenConfig,
    pub cycle: Arc<DecisionCycle>,
    pub pool: Arc<ChangeTicketPool>,
    pub health: Arc<HealthLoop>,
    pub health_log: Arc<FileLog<HealthEvent>>,
    pub inbox: ControlInbox,
    pub restored: RestoreReport,
    /// Decisions recovered from tickets because their log entry was missing.
    pub recovered_decisions: usize,
    /// Operator requests applied while opening.
    pub applied_requests: Vec<ControlOutcome>,
    executor: Option<JoinHandle<()>>,
    _lock: StateLock,
}

impl Runtime {
    /// Open with the file telemetry source from configuration.
    pub async fn open(
        config: SwenConfig,
        executor: Option<Arc<dyn ChangeExecutor>>,
    ) -> DaemonResult<Self> {
        let telemetry = Arc::new(FileTelemetrySource::new(config.paths.telemetry.clone()));
        Self::open_with_source(config, telemetry, executor).await
    }

    /// Open with an explicit telemetry source.
    ///
    /// With an executor, approved tickets (including ones restored from the
    /// store) are applied in the background.
    pub async fn open_with_source(
        config: SwenConfig,
        telemetry: Arc<dyn TelemetrySource>,
        executor: Option<Arc<dyn ChangeExecutor>>,
    ) -> DaemonResult<Self> {
        let paths = config.paths.clone();
        tokio::fs::create_dir_all(&paths.state_dir).await?;
        let lock = StateLock::acquire(paths.lock_file())?;

        let decision_log = Arc::new(FileLog::<Decision>::open(paths.decision_log()).await?);
        let health_log = Arc::new(FileLog::<HealthEvent>::open_lenient(paths.health_log()).await?);
        let history = Arc::new(FileLog::<ChangeTicket>::open(paths.ticket_history()).await?);
        let store = Arc::new(FileTicketStore::open(paths.tickets_dir()).await?);

        let mut pool =
            ChangeTicketPool::new(config.pool.clone(), store).with_history(history.clone());
        if config.notify.enabled {
            let notifier = Arc::new(FileProposalNotifier::new(paths.outbox_dir()));
            pool = pool.with_notifier(
                NotificationDispatcher::new(notifier, config.notify.backoff.clone())
                    .with_health_log(health_log.clone()),
            );
        }
        let pool = Arc::new(pool);

        // Register the executor first so restored approvals reach it.
        let executor = executor.map(|executor| ExecutorWorker::spawn(pool.clone(), executor));
        let restored = pool.restore().await?;

        let maker = Arc::new(DecisionMaker::restore(config.engine.clone(), decision_log).await?);
        let ticketed: Vec<DecisionKey> = pool
            .list()
            .iter()
            .chain(history.read_all().await?.iter())
            .filter_map(ChangeTicket::decision_key)
            .collect();
        let recovered_decisions = maker.mark_processed(ticketed);
        if recovered_decisions > 0 {
            warn!(
                decisions = recovered_decisions,
                "Recovered decisions missing from the decision log"
            );
        }
        let gate = Arc::new(config.policy.gate()?);

        let mut health = HealthLoop::new(config.health.clone(), health_log.clone())?;
        health.register(
            Subsystem::new(POOL_SUBSYSTEM, Arc::new(PoolProbe::new(pool.clone())))
                .with_remediator(Arc::new(PoolRemediator::new(pool.clone()))),
        )?;

        let cycle = Arc::new(DecisionCycle::new(
            telemetry,
            maker,
            gate,
            pool.clone(),
            config.services.clone(),
        ));

        let inbox = ControlInbox::new(paths.control_dir());
        let applied_requests = inbox.drain(&pool).await?;

        info!(
            state_dir = %paths.state_dir.display(),
            tickets = restored.loaded,
            evicted = restored.evicted.len(),
            requests = applied_requests.len(),
            "Runtime opened"
        );

        Ok(Self {
            config,
            cycle,
            pool,
            health: Arc::new(health),
            health_log,
            inbox,
            restored,
            recovered_decisions,
            applied_requests,
            executor,
            _lock: lock,
        })
    }

    /// Stop accepting approvals and let the executor finish the tickets it
    /// already holds, up to `cycle.shutdown_timeout_secs`.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.executor.take() {
            let timeout = self.config.cycle.shutdown_timeout();
            if ExecutorWorker::drain(&self.pool, handle, timeout).await {
                info!("Executor drained");
            }
        }
    }

    /// Abort the executor worker, if one was started. Tickets it was
    /// applying are sent to the executor again on the next open.
    pub fn close(&mut self) {
        if let Some(handle) = self.executor.take() {
            handle.abort();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.close();
    }
}

//! The bounded change ticket pool.
//!
//! All mutations take the writer mutex, persist through the
//! [`TicketStore`], and only then update the in-memory state and publish a
//! fresh read view. Readers (`list`, `count`, `can_create`, reports) use the
//! published view and never wait on a writer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use swen_ledger::AppendLog;
use swen_types::{ChangeTicket, DecisionId, TicketId, TicketState, VerdictOutcome};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::executor::ApplyOutcome;
use crate::notify::NotificationDispatcher;
use crate::report::{StaleAlert, StatusReport};
use crate::store::TicketStore;

/// Number of decision ids remembered for duplicate detection.
const DECISION_MEMORY: usize = 4096;

/// Result of a creation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Created(ChangeTicket),
    /// Not admitted. Expected under load; the reason is logged.
    Rejected { reason: String },
}

impl Admission {
    pub fn is_created(&self) -> bool {
        matches!(self, Admission::Created(_))
    }

    pub fn ticket(&self) -> Option<&ChangeTicket> {
        match self {
            Admission::Created(t) => Some(t),
            Admission::Rejected { .. } => None,
        }
    }
}

/// Events emitted by the pool.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Created {
        ticket_id: TicketId,
        service: String,
    },
    Transitioned {
        ticket_id: TicketId,
        service: String,
        from: TicketState,
        to: TicketState,
    },
    Refused {
        service: String,
        reason: String,
    },
}

/// Outcome of loading persisted tickets at startup.
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub loaded: usize,
    pub evicted: Vec<ChangeTicket>,

    /// Approved and interrupted (`Applying`) tickets sent to the executor.
    pub redispatched: usize,

    /// Tickets whose proposal had not been delivered and was sent again.
    pub renotified: usize,
}

/// Read view published after every mutation.
#[derive(Debug, Default)]
struct PoolView {
    /// Open tickets in eviction order.
    tickets: Vec<ChangeTicket>,
}

#[derive(Default)]
struct PoolState {
    tickets: HashMap<TicketId, ChangeTicket>,
    decisions: HashSet<DecisionId>,
    decision_order: VecDeque<DecisionId>,
    next_seq: u64,
}

impl PoolState {
    fn remember(&mut self, id: DecisionId) {
        if self.decisions.insert(id.clone()) {
            self.decision_order.push_back(id);
            while self.decision_order.len() > DECISION_MEMORY {
                if let Some(old) = self.decision_order.pop_front() {
                    self.decisions.remove(&old);
                }
            }
        }
    }

    /// Evictable tickets, oldest first.
    fn evictable(&self) -> Vec<&ChangeTicket> {
        let mut v: Vec<&ChangeTicket> = self
            .tickets
            .values()
            .filter(|t| t.state.is_evictable())
            .collect();
        v.sort_by_key(|t| t.eviction_key());
        v
    }
}

/// Bounded store of open change tickets.
pub struct ChangeTicketPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    view: RwLock<Arc<PoolView>>,
    store: Arc<dyn TicketStore>,
    history: Option<Arc<dyn AppendLog<ChangeTicket>>>,
    notifier: Option<NotificationDispatcher>,
    approved_tx: RwLock<Option<mpsc::UnboundedSender<ChangeTicket>>>,
    event_tx: broadcast::Sender<PoolEvent>,
}

impl ChangeTicketPool {
    pub fn new(config: PoolConfig, store: Arc<dyn TicketStore>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            state: Mutex::new(PoolState::default()),
            view: RwLock::new(Arc::new(PoolView::default())),
            store,
            history: None,
            notifier: None,
            approved_tx: RwLock::new(None),
            event_tx,
        }
    }

    /// Append tickets that reach a terminal state to this log.
    pub fn with_history(mut self, log: Arc<dyn AppendLog<ChangeTicket>>) -> Self {
        self.history = Some(log);
        self
    }

    /// Publish a proposal for every created ticket.
    pub fn with_notifier(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.notifier = Some(dispatcher);
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.event_tx.subscribe()
    }

    /// Register the executor channel. Every ticket that becomes `Approved`
    /// is sent here. A later call replaces the previous receiver.
    pub fn on_approved(&self) -> mpsc::UnboundedReceiver<ChangeTicket> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.approved_tx.write() = Some(tx);
        rx
    }

    /// Close the executor channel. The receiver drains what was already
    /// sent and then ends; later approvals wait for the next restore.
    pub fn detach_executor(&self) {
        *self.approved_tx.write() = None;
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Open tickets, oldest first.
    pub fn list(&self) -> Vec<ChangeTicket> {
        self.view.read().tickets.clone()
    }

    pub fn count(&self) -> usize {
        self.view.read().tickets.len()
    }

    pub fn get(&self, id: &TicketId) -> Option<ChangeTicket> {
        self.view.read().tickets.iter().find(|t| &t.id == id).cloned()
    }

    /// Whether a ticket for `service` would be admitted right now.
    pub fn can_create(&self, service: &str) -> (bool, String) {
        let view = self.current_view();
        match check_admission(view.tickets.iter(), service, Utc::now(), &self.config) {
            Ok(()) => (true, "OK".to_string()),
            Err(reason) => (false, reason),
        }
    }

    /// Open tickets older than the stale threshold.
    pub fn stale_tickets(&self) -> Vec<ChangeTicket> {
        self.stale_tickets_at(Utc::now())
    }

    pub fn stale_alerts(&self) -> Vec<StaleAlert> {
        let now = Utc::now();
        let threshold = self.config.stale_threshold();
        self.stale_tickets_at(now)
            .iter()
            .map(|t| StaleAlert::for_ticket(t, now, threshold))
            .collect()
    }

    pub fn status_report(&self) -> StatusReport {
        let now = Utc::now();
        let threshold = self.config.stale_threshold();
        let tickets = self.list();
        let alerts = tickets
            .iter()
            .filter(|t| t.age(now) > threshold)
            .map(|t| StaleAlert::for_ticket(t, now, threshold))
            .collect();
        StatusReport::build(tickets, self.config.max_tickets, alerts, now)
    }

    /// Within bound and nothing stale.
    pub fn is_healthy(&self) -> bool {
        self.count() <= self.config.max_tickets && self.stale_tickets().is_empty()
    }

    fn stale_tickets_at(&self, now: DateTime<Utc>) -> Vec<ChangeTicket> {
        let threshold = self.config.stale_threshold();
        self.current_view()
            .tickets
            .iter()
            .filter(|t| t.age(now) > threshold)
            .cloned()
            .collect()
    }

    fn current_view(&self) -> Arc<PoolView> {
        self.view.read().clone()
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Admit a pending ticket. Check and insert happen under the writer
    /// lock, so concurrent callers can never push the pool over its bound.
    #[instrument(skip(self, ticket), fields(service = %ticket.service, ticket_id = %ticket.id))]
    pub async fn create(&self, mut ticket: ChangeTicket) -> PoolResult<Admission> {
        if ticket.verdict.outcome == VerdictOutcome::Block {
            return Ok(self.refuse(
                &ticket.service,
                format!("blocked by policy: {}", ticket.verdict.reason()),
            ));
        }
        if ticket.state != TicketState::Pending {
            return Ok(self.refuse(
                &ticket.service,
                format!("new tickets must be pending, got {}", ticket.state),
            ));
        }

        let mut state = self.state.lock().await;

        if state.decisions.contains(&ticket.decision_id) {
            return Ok(self.refuse(
                &ticket.service,
                format!("duplicate decision {}", ticket.decision_id),
            ));
        }
        if let Err(reason) =
            check_admission(state.tickets.values(), &ticket.service, Utc::now(), &self.config)
        {
            return Ok(self.refuse(&ticket.service, reason));
        }

        ticket.seq = state.next_seq;
        self.store.put(&ticket).await?;

        state.next_seq += 1;
        state.remember(ticket.decision_id.clone());
        state.tickets.insert(ticket.id.clone(), ticket.clone());
        self.publish(&state);
        let open = state.tickets.len();
        drop(state);

        info!(
            ticket_id = %ticket.id,
            service = %ticket.service,
            from = %ticket.from_provider,
            to = %ticket.to_provider,
            open = open,
            max = self.config.max_tickets,
            "Created change ticket"
        );
        let _ = self.event_tx.send(PoolEvent::Created {
            ticket_id: ticket.id.clone(),
            service: ticket.service.clone(),
        });

        if let Some(dispatcher) = &self.notifier {
            dispatcher.dispatch(ticket.clone());
        }

        Ok(Admission::Created(ticket))
    }

    /// Move a freshly created ticket to where its verdict sends it.
    pub async fn route(&self, id: &TicketId) -> PoolResult<ChangeTicket> {
        let outcome = self
            .get(id)
            .ok_or_else(|| PoolError::NotFound(id.clone()))?
            .verdict
            .outcome;
        match outcome {
            VerdictOutcome::AutoApprove => self.approve(id).await,
            _ => self.mark_manual_review(id).await,
        }
    }

    /// Approve a pending or reviewed ticket and hand it to the executor.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: &TicketId) -> PoolResult<ChangeTicket> {
        let ticket = self.mutate(id, TicketState::Approved, None).await?;
        self.dispatch_approved(&ticket);
        Ok(ticket)
    }

    pub async fn mark_manual_review(&self, id: &TicketId) -> PoolResult<ChangeTicket> {
        self.mutate(id, TicketState::ManualReview, None).await
    }

    /// Reject a ticket waiting for review.
    #[instrument(skip(self))]
    pub async fn reject(&self, id: &TicketId, reason: &str) -> PoolResult<ChangeTicket> {
        self.mutate(id, TicketState::Rejected, Some(format!("rejected: {}", reason)))
            .await
    }

    /// Operator-driven eviction of a pending or reviewed ticket.
    #[instrument(skip(self))]
    pub async fn force_evict(&self, id: &TicketId) -> PoolResult<ChangeTicket> {
        let ticket = self
            .mutate(id, TicketState::Expired, Some("evicted by operator".to_string()))
            .await?;
        warn!(ticket_id = %id, service = %ticket.service, "Ticket force-evicted");
        Ok(ticket)
    }

    /// Hand an approved ticket to the executor (`Approved -> Applying`).
    pub async fn begin_apply(&self, id: &TicketId) -> PoolResult<ChangeTicket> {
        self.mutate(id, TicketState::Applying, None).await
    }

    /// Executor callback: `Applying -> Applied | Failed`.
    #[instrument(skip(self))]
    pub async fn report_outcome(
        &self,
        id: &TicketId,
        outcome: ApplyOutcome,
    ) -> PoolResult<ChangeTicket> {
        match outcome {
            ApplyOutcome::Success => self.mutate(id, TicketState::Applied, None).await,
            ApplyOutcome::Failure(cause) => {
                let ticket = self
                    .mutate(id, TicketState::Failed, Some(format!("apply failed: {}", cause)))
                    .await?;
                warn!(ticket_id = %id, service = %ticket.service, cause = %cause, "Change failed to apply");
                Ok(ticket)
            }
        }
    }

    /// Expire the oldest evictable tickets until the pool is within bound.
    ///
    /// Returns the evicted tickets; a second call with no insert in between
    /// evicts nothing.
    #[instrument(skip(self))]
    pub async fn enforce_limit(&self) -> PoolResult<Vec<ChangeTicket>> {
        let mut state = self.state.lock().await;
        let result = self.enforce_limit_locked(&mut state).await;
        self.publish(&state);
        result
    }

    /// Expire every stale, evictable ticket.
    #[instrument(skip(self))]
    pub async fn evict_stale(&self) -> PoolResult<Vec<ChangeTicket>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let threshold = self.config.stale_threshold();

        let victims: Vec<(TicketId, f64)> = state
            .evictable()
            .into_iter()
            .filter(|t| t.age(now) > threshold)
            .map(|t| (t.id.clone(), t.age(now).num_seconds() as f64 / 3600.0))
            .collect();

        let mut evicted = Vec::with_capacity(victims.len());
        for (id, age_hours) in victims {
            let note = format!("evicted: stale for {:.1} hours", age_hours);
            match self.transition_locked(&mut state, &id, TicketState::Expired, Some(note)).await {
                Ok(t) => {
                    warn!(ticket_id = %id, service = %t.service, age_hours = age_hours, "Evicted stale ticket");
                    evicted.push(t);
                }
                Err(e) => {
                    self.publish(&state);
                    return Err(e);
                }
            }
        }

        self.publish(&state);
        Ok(evicted)
    }

    /// Load persisted tickets, bring the pool back within bound, re-send
    /// approved and interrupted tickets to the executor and undelivered
    /// proposals to the notifier.
    ///
    /// Fails with [`PoolError::Corrupt`] when stored state cannot be read.
    pub async fn restore(&self) -> PoolResult<RestoreReport> {
        let loaded = self.store.load_all().await?;
        let mut state = self.state.lock().await;
        *state = PoolState::default();

        let mut count = 0;
        for ticket in loaded {
            if ticket.state.is_terminal() {
                self.store.delete(&ticket.id).await?;
                continue;
            }
            if ticket.state == TicketState::Applying {
                warn!(
                    ticket_id = %ticket.id,
                    service = %ticket.service,
                    "Ticket was applying at shutdown; sending it to the executor again"
                );
            }
            state.next_seq = state.next_seq.max(ticket.seq + 1);
            state.remember(ticket.decision_id.clone());
            state.tickets.insert(ticket.id.clone(), ticket);
            count += 1;
        }

        let enforced = self.enforce_limit_locked(&mut state).await;
        self.publish(&state);
        let evicted = enforced?;
        drop(state);

        let open = self.list();
        let pending_apply: Vec<&ChangeTicket> = open
            .iter()
            .filter(|t| matches!(t.state, TicketState::Approved | TicketState::Applying))
            .collect();
        for ticket in &pending_apply {
            self.dispatch_approved(ticket);
        }

        let renotified = match &self.notifier {
            Some(dispatcher) => dispatcher.redeliver_missing(&open).await.len(),
            None => 0,
        };

        info!(
            loaded = count,
            evicted = evicted.len(),
            redispatched = pending_apply.len(),
            renotified = renotified,
            "Restored ticket pool"
        );

        Ok(RestoreReport {
            loaded: count,
            evicted,
            redispatched: pending_apply.len(),
            renotified,
        })
    }

    /// Load persisted tickets into the read view only. Nothing is evicted,
    /// deleted, dispatched or written; used to inspect the state of a pool
    /// owned by another process. Returns the number of open tickets.
    pub async fn load_view(&self) -> PoolResult<usize> {
        let loaded = self.store.load_all().await?;
        let mut state = self.state.lock().await;
        *state = PoolState::default();
        for ticket in loaded.into_iter().filter(|t| t.is_open()) {
            state.next_seq = state.next_seq.max(ticket.seq + 1);
            state.tickets.insert(ticket.id.clone(), ticket);
        }
        self.publish(&state);
        Ok(state.tickets.len())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn mutate(
        &self,
        id: &TicketId,
        to: TicketState,
        note: Option<String>,
    ) -> PoolResult<ChangeTicket> {
        let mut state = self.state.lock().await;
        let result = self.transition_locked(&mut state, id, to, note).await;
        self.publish(&state);
        result
    }

    async fn enforce_limit_locked(&self, state: &mut PoolState) -> PoolResult<Vec<ChangeTicket>> {
        let max = self.config.max_tickets;
        let excess = state.tickets.len().saturating_sub(max);
        if excess == 0 {
            return Ok(Vec::new());
        }

        let victims: Vec<TicketId> = state
            .evictable()
            .into_iter()
            .take(excess)
            .map(|t| t.id.clone())
            .collect();
        if victims.len() < excess {
            warn!(
                open = state.tickets.len(),
                max = max,
                evictable = victims.len(),
                "Pool over limit with tickets that cannot be evicted"
            );
        }

        let mut evicted = Vec::with_capacity(victims.len());
        for id in victims {
            let note = format!("evicted: pool over limit ({} max)", max);
            let ticket = self
                .transition_locked(state, &id, TicketState::Expired, Some(note))
                .await?;
            warn!(
                ticket_id = %ticket.id,
                service = %ticket.service,
                created_at = %ticket.created_at,
                "Evicted ticket to enforce pool limit"
            );
            evicted.push(ticket);
        }
        Ok(evicted)
    }

    /// Apply one transition, persist it, then commit it in memory.
    async fn transition_locked(
        &self,
        state: &mut PoolState,
        id: &TicketId,
        to: TicketState,
        note: Option<String>,
    ) -> PoolResult<ChangeTicket> {
        let mut ticket = state
            .tickets
            .get(id)
            .cloned()
            .ok_or_else(|| PoolError::NotFound(id.clone()))?;
        let from = ticket.state;

        match note {
            Some(note) => ticket.transition_with_note(to, note)?,
            None => ticket.transition(to)?,
        }

        if to.is_terminal() {
            self.store.delete(id).await?;
            state.tickets.remove(id);
            if let Some(history) = &self.history {
                if let Err(e) = history.append(&ticket).await {
                    warn!(ticket_id = %id, error = %e, "Failed to append ticket history");
                }
            }
        } else {
            self.store.put(&ticket).await?;
            state.tickets.insert(id.clone(), ticket.clone());
        }

        debug!(ticket_id = %id, from = %from, to = %to, "Ticket transitioned");
        let _ = self.event_tx.send(PoolEvent::Transitioned {
            ticket_id: id.clone(),
            service: ticket.service.clone(),
            from,
            to,
        });
        Ok(ticket)
    }

    fn publish(&self, state: &PoolState) {
        let mut tickets: Vec<ChangeTicket> = state.tickets.values().cloned().collect();
        tickets.sort_by_key(|t| t.eviction_key());
        *self.view.write() = Arc::new(PoolView { tickets });
    }

    fn refuse(&self, service: &str, reason: String) -> Admission {
        warn!(service = %service, reason = %reason, "Ticket not created");
        let _ = self.event_tx.send(PoolEvent::Refused {
            service: service.to_string(),
            reason: reason.clone(),
        });
        Admission::Rejected { reason }
    }

    fn dispatch_approved(&self, ticket: &ChangeTicket) {
        match self.approved_tx.read().as_ref() {
            Some(tx) => {
                if tx.send(ticket.clone()).is_err() {
                    warn!(ticket_id = %ticket.id, "Executor channel closed; ticket stays approved");
                }
            }
            None => debug!(ticket_id = %ticket.id, "No executor registered; ticket stays approved"),
        }
    }
}

/// Admission rule shared by `can_create` and `create`.
fn check_admission<'a>(
    tickets: impl IntoIterator<Item = &'a ChangeTicket>,
    service: &str,
    now: DateTime<Utc>,
    config: &PoolConfig,
) -> Result<(), String> {
    let threshold = config.stale_threshold();
    let mut open = 0usize;
    let mut stale = 0usize;
    let mut service_open = false;

    for t in tickets {
        open += 1;
        if t.age(now) > threshold {
            stale += 1;
        }
        if t.service == service {
            service_open = true;
        }
    }

    if open >= config.max_tickets {
        return Err(format!(
            "limit reached: {}/{} open tickets",
            open, config.max_tickets
        ));
    }
    if stale > 0 {
        return Err(format!(
            "stale tickets: {} unresolved tickets older than {}h need attention",
            stale,
            threshold.num_hours()
        ));
    }
    if service_open {
        return Err(format!("ticket already open for service {}", service));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{AlertSeverity, PoolStatus};
    use crate::config::BackoffConfig;
    use crate::notify::{FileProposalNotifier, TicketNotifier};
    use crate::store::InMemoryTicketStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use swen_ledger::MemoryLog;
    use swen_types::{Verdict, VerdictOutcome};

    fn ticket(service: &str, outcome: VerdictOutcome, age_hours: i64) -> ChangeTicket {
        let decision_id = DecisionId::generate();
        ChangeTicket {
            id: TicketId::generate(),
            decision_id: decision_id.clone(),
            service: service.into(),
            from_provider: "aws".into(),
            to_provider: "alibaba".into(),
            created_at: Utc::now() - Duration::hours(age_hours),
            snapshot_id: None,
            seq: 0,
            state: TicketState::Pending,
            verdict: Verdict::new(decision_id, outcome, vec!["test".into()]),
            predicted_monthly_savings: 100.0,
            applied_at: None,
            updated_at: None,
            note: None,
        }
    }

    fn pending(service: &str) -> ChangeTicket {
        ticket(service, VerdictOutcome::ManualReview, 0)
    }

    fn pool() -> ChangeTicketPool {
        ChangeTicketPool::new(PoolConfig::default(), Arc::new(InMemoryTicketStore::new()))
    }

    /// Store that refuses every write.
    struct FailingStore;

    #[async_trait]
    impl TicketStore for FailingStore {
        async fn put(&self, _ticket: &ChangeTicket) -> PoolResult<()> {
            Err(PoolError::Store("disk full".into()))
        }
        async fn delete(&self, _id: &TicketId) -> PoolResult<()> {
            Err(PoolError::Store("disk full".into()))
        }
        async fn load_all(&self) -> PoolResult<Vec<ChangeTicket>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_sixth_ticket_refused_at_limit() {
        let pool = pool();
        for i in 0..5 {
            assert!(pool.create(pending(&format!("svc-{}", i))).await.unwrap().is_created());
        }

        let (ok, reason) = pool.can_create("svc-5");
        assert!(!ok);
        assert!(reason.starts_with("limit reached"));

        let admission = pool.create(pending("svc-5")).await.unwrap();
        assert!(matches!(admission, Admission::Rejected { ref reason } if reason.starts_with("limit reached")));
        assert_eq!(pool.count(), 5);
    }

    #[tokio::test]
    async fn test_one_open_ticket_per_service() {
        let pool = pool();
        pool.create(pending("api")).await.unwrap();

        let (ok, reason) = pool.can_create("api");
        assert!(!ok);
        assert!(reason.contains("already open"));
        assert!(!pool.create(pending("api")).await.unwrap().is_created());
        assert!(pool.can_create("db").0);
    }

    #[tokio::test]
    async fn test_duplicate_decision_rejected() {
        let pool = pool();
        let first = pending("api");
        let mut again = pending("db");
        again.decision_id = first.decision_id.clone();

        pool.create(first).await.unwrap();
        let admission = pool.create(again).await.unwrap();
        assert!(matches!(admission, Admission::Rejected { ref reason } if reason.starts_with("duplicate decision")));
        assert_eq!(pool.count(), 1);
    }

    #[tokio::test]
    async fn test_blocked_verdict_never_creates_ticket() {
        let pool = pool();
        let admission = pool.create(ticket("api", VerdictOutcome::Block, 0)).await.unwrap();
        assert!(!admission.is_created());
        assert_eq!(pool.count(), 0);
    }

    #[tokio::test]
    async fn test_stale_ticket_pauses_new_work_until_evicted() {
        let stale = ticket("api", VerdictOutcome::ManualReview, 25);
        let stale_id = stale.id.clone();
        let store = Arc::new(InMemoryTicketStore::with_tickets([stale]));
        let pool = ChangeTicketPool::new(PoolConfig::default(), store);
        pool.restore().await.unwrap();

        assert_eq!(pool.stale_tickets().len(), 1);
        let (ok, reason) = pool.can_create("db");
        assert!(!ok);
        assert!(reason.starts_with("stale tickets"));
        assert!(!pool.is_healthy());

        let evicted = pool.force_evict(&stale_id).await.unwrap();
        assert_eq!(evicted.state, TicketState::Expired);
        assert!(pool.can_create("db").0);
        assert!(pool.is_healthy());
    }

    #[tokio::test]
    async fn test_evict_stale_leaves_fresh_tickets() {
        let store = Arc::new(InMemoryTicketStore::with_tickets([
            ticket("old", VerdictOutcome::ManualReview, 30),
            ticket("new", VerdictOutcome::ManualReview, 1),
        ]));
        let pool = ChangeTicketPool::new(PoolConfig::default(), store);
        pool.restore().await.unwrap();

        let evicted = pool.evict_stale().await.unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].service, "old");
        assert_eq!(pool.count(), 1);
        assert!(pool.evict_stale().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_over_limit_evicts_oldest_first() {
        let tickets: Vec<ChangeTicket> = (0..8)
            .map(|i| ticket(&format!("svc-{}", i), VerdictOutcome::ManualReview, 10 - i))
            .collect();
        let store = Arc::new(InMemoryTicketStore::with_tickets(tickets));
        let pool = ChangeTicketPool::new(PoolConfig::default(), store.clone());

        let report = pool.restore().await.unwrap();
        assert_eq!(report.loaded, 8);
        let mut evicted: Vec<String> = report.evicted.iter().map(|t| t.service.clone()).collect();
        evicted.sort();
        assert_eq!(evicted, vec!["svc-0", "svc-1", "svc-2"]);
        assert!(report.evicted.iter().all(|t| t.state == TicketState::Expired));
        assert_eq!(pool.count(), 5);
        assert_eq!(store.len(), 5);

        assert!(pool.enforce_limit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enforce_limit_skips_tickets_in_flight() {
        let mut applying = ticket("busy", VerdictOutcome::AutoApprove, 20);
        applying.state = TicketState::Applying;
        let mut tickets = vec![applying];
        tickets.extend((0..5).map(|i| ticket(&format!("svc-{}", i), VerdictOutcome::ManualReview, 5 - i)));
        let store = Arc::new(InMemoryTicketStore::with_tickets(tickets));
        let pool = ChangeTicketPool::new(PoolConfig::default(), store);

        let report = pool.restore().await.unwrap();
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.evicted[0].service, "svc-0");
        assert!(pool.list().iter().any(|t| t.service == "busy"));
    }

    #[tokio::test]
    async fn test_tie_on_created_at_broken_by_insertion_order() {
        let at = Utc::now() - Duration::hours(1);
        let tickets: Vec<ChangeTicket> = (0..7)
            .map(|i| {
                let mut t = pending(&format!("svc-{}", i));
                t.created_at = at;
                t.seq = i as u64;
                t
            })
            .collect();
        let pool = ChangeTicketPool::new(
            PoolConfig::default(),
            Arc::new(InMemoryTicketStore::with_tickets(tickets)),
        );

        let report = pool.restore().await.unwrap();
        let seqs: Vec<u64> = report.evicted.iter().map(|t| t.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_no_ticket() {
        let pool = ChangeTicketPool::new(PoolConfig::default(), Arc::new(FailingStore));
        let err = pool.create(pending("api")).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(pool.count(), 0);
        assert!(pool.can_create("api").0);
    }

    #[tokio::test]
    async fn test_auto_approved_ticket_reaches_executor_and_applies() {
        let history = Arc::new(MemoryLog::<ChangeTicket>::new());
        let store = Arc::new(InMemoryTicketStore::new());
        let pool = ChangeTicketPool::new(PoolConfig::default(), store.clone())
            .with_history(history.clone());
        let mut approved_rx = pool.on_approved();

        let t = ticket("api", VerdictOutcome::AutoApprove, 0);
        let id = t.id.clone();
        pool.create(t).await.unwrap();
        let routed = pool.route(&id).await.unwrap();
        assert_eq!(routed.state, TicketState::Approved);

        let sent = approved_rx.recv().await.unwrap();
        assert_eq!(sent.id, id);

        pool.begin_apply(&id).await.unwrap();
        let done = pool.report_outcome(&id, ApplyOutcome::Success).await.unwrap();
        assert_eq!(done.state, TicketState::Applied);
        assert!(done.applied_at.is_some());

        assert_eq!(pool.count(), 0);
        assert!(store.is_empty());
        assert_eq!(history.records().len(), 1);
    }

    #[tokio::test]
    async fn test_review_then_reject() {
        let pool = pool();
        let t = pending("api");
        let id = t.id.clone();
        pool.create(t).await.unwrap();
        assert_eq!(pool.route(&id).await.unwrap().state, TicketState::ManualReview);

        let rejected = pool.reject(&id, "freeze window").await.unwrap();
        assert_eq!(rejected.state, TicketState::Rejected);
        assert_eq!(rejected.note.as_deref(), Some("rejected: freeze window"));
        assert!(pool.get(&id).is_none());
        assert!(matches!(pool.reject(&id, "again").await, Err(PoolError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_apply_recorded() {
        let pool = pool();
        let t = ticket("api", VerdictOutcome::AutoApprove, 0);
        let id = t.id.clone();
        pool.create(t).await.unwrap();
        pool.approve(&id).await.unwrap();
        pool.begin_apply(&id).await.unwrap();

        let failed = pool
            .report_outcome(&id, ApplyOutcome::Failure("quota exceeded".into()))
            .await
            .unwrap();
        assert_eq!(failed.state, TicketState::Failed);
        assert!(pool.can_create("api").0);
    }

    #[tokio::test]
    async fn test_illegal_transition_is_error() {
        let pool = pool();
        let t = pending("api");
        let id = t.id.clone();
        pool.create(t).await.unwrap();
        pool.approve(&id).await.unwrap();

        assert!(matches!(
            pool.force_evict(&id).await,
            Err(PoolError::InvalidTransition(_))
        ));
        assert_eq!(pool.get(&id).unwrap().state, TicketState::Approved);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_respect_bound() {
        let pool = Arc::new(pool());
        let mut handles = Vec::new();
        for i in 0..32 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.create(pending(&format!("svc-{}", i))).await.unwrap()
            }));
        }

        let mut created = 0;
        for h in handles {
            if h.await.unwrap().is_created() {
                created += 1;
            }
            assert!(pool.count() <= 5);
        }
        assert_eq!(created, 5);
        assert_eq!(pool.count(), 5);
    }

    #[tokio::test]
    async fn test_status_report_flags_stale_severity() {
        let store = Arc::new(InMemoryTicketStore::with_tickets([
            ticket("api", VerdictOutcome::ManualReview, 25),
            ticket("db", VerdictOutcome::ManualReview, 49),
        ]));
        let pool = ChangeTicketPool::new(PoolConfig::default(), store);
        pool.restore().await.unwrap();

        let report = pool.status_report();
        assert_eq!(report.status, PoolStatus::Stale);
        assert!(!report.can_create_new);
        assert_eq!(report.alerts.len(), 2);
        let db = report.alerts.iter().find(|a| a.service == "db").unwrap();
        assert_eq!(db.severity, AlertSeverity::High);
        let api = report.alerts.iter().find(|a| a.service == "api").unwrap();
        assert_eq!(api.severity, AlertSeverity::Medium);
        assert!(report.recommendations.contains(&"Resolve 2 unresolved tickets".to_string()));
    }

    #[tokio::test]
    async fn test_restore_redispatches_interrupted_apply() {
        let mut applying = ticket("api", VerdictOutcome::AutoApprove, 1);
        applying.state = TicketState::Applying;
        let pool = ChangeTicketPool::new(
            PoolConfig::default(),
            Arc::new(InMemoryTicketStore::with_tickets([applying.clone()])),
        );
        let mut rx = pool.on_approved();

        let report = pool.restore().await.unwrap();
        assert_eq!(report.redispatched, 1);
        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.id, applying.id);
        assert_eq!(sent.state, TicketState::Applying);

        let failed = pool
            .report_outcome(&applying.id, ApplyOutcome::Failure("interrupted".into()))
            .await
            .unwrap();
        assert_eq!(failed.state, TicketState::Failed);
        assert_eq!(pool.count(), 0);
    }

    #[tokio::test]
    async fn test_load_view_does_not_touch_store() {
        let tickets: Vec<ChangeTicket> = (0..7)
            .map(|i| ticket(&format!("svc-{}", i), VerdictOutcome::ManualReview, 30 + i))
            .collect();
        let store = Arc::new(InMemoryTicketStore::with_tickets(tickets));
        let pool = ChangeTicketPool::new(PoolConfig::default(), store.clone());

        assert_eq!(pool.load_view().await.unwrap(), 7);
        assert_eq!(pool.count(), 7);
        assert_eq!(pool.stale_tickets().len(), 7);
        assert_eq!(store.len(), 7);
        assert!(store.load_all().await.unwrap().iter().all(|t| t.state == TicketState::Pending));
    }

    #[tokio::test]
    async fn test_detached_executor_channel_closes() {
        let pool = pool();
        let mut rx = pool.on_approved();
        let t = ticket("api", VerdictOutcome::AutoApprove, 0);
        let id = t.id.clone();
        pool.create(t).await.unwrap();
        pool.approve(&id).await.unwrap();

        pool.detach_executor();
        assert_eq!(rx.recv().await.unwrap().id, id);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_restore_redispatches_approved() {
        let mut approved = ticket("api", VerdictOutcome::AutoApprove, 1);
        approved.state = TicketState::Approved;
        let pool = ChangeTicketPool::new(
            PoolConfig::default(),
            Arc::new(InMemoryTicketStore::with_tickets([approved.clone()])),
        );
        let mut rx = pool.on_approved();

        let report = pool.restore().await.unwrap();
        assert_eq!(report.redispatched, 1);
        assert_eq!(rx.recv().await.unwrap().id, approved.id);
    }

    #[tokio::test]
    async fn test_restore_resends_undelivered_proposals() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let notifier = Arc::new(FileProposalNotifier::new(&outbox));
        let sent = pending("api");
        let lost = pending("db");
        notifier.notify(&sent).await.unwrap();

        let pool = ChangeTicketPool::new(
            PoolConfig::default(),
            Arc::new(InMemoryTicketStore::with_tickets([sent.clone(), lost.clone()])),
        )
        .with_notifier(NotificationDispatcher::new(notifier.clone(), BackoffConfig::default()));

        let report = pool.restore().await.unwrap();
        assert_eq!(report.renotified, 1);
        for _ in 0..50 {
            if notifier.delivered(&lost).await.unwrap() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(notifier.delivered(&lost).await.unwrap());
    }
}

//! Decision maker.
//!
//! Turns one service's slice of a snapshot into at most one [`Decision`].
//! Results are remembered per `(service, snapshot_id)`, so evaluating the
//! same snapshot twice returns the first result instead of recomputing it.
//!
//! An emitted decision reaches the decision log only through
//! [`DecisionMaker::commit`], which the caller invokes once the decision's
//! outcome (ticket created, blocked, dropped) is itself durable. A failed
//! append is queued and retried on the next call, never surfaced to the
//! cycle.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use swen_ledger::AppendLog;
use swen_types::{Assignment, Decision, DecisionId, SnapshotId, TelemetrySnapshot};
use tracing::{debug, info, instrument, warn};

use crate::confidence::confidence;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::scoring::Scorer;

/// `(service, snapshot_id)`.
pub type DecisionKey = (String, SnapshotId);

/// Result of evaluating one service against one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// A new decision was produced. It is not logged until committed.
    Emitted(Decision),

    /// This `(service, snapshot)` was already evaluated; the earlier result
    /// is returned unchanged.
    Replayed(Option<Decision>),

    /// No actionable decision. `reason` is human-readable.
    Dropped { service: String, reason: String },
}

impl Evaluation {
    /// The decision carried by this evaluation, if any.
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            Evaluation::Emitted(d) => Some(d),
            Evaluation::Replayed(d) => d.as_ref(),
            Evaluation::Dropped { .. } => None,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Evaluation::Emitted(_))
    }
}

/// Bounded memo of evaluated `(service, snapshot)` keys.
struct DecisionCache {
    entries: HashMap<DecisionKey, Option<Decision>>,
    order: VecDeque<DecisionKey>,
    capacity: usize,
}

impl DecisionCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &DecisionKey) -> Option<&Option<Decision>> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: DecisionKey, value: Option<Decision>) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, key: &DecisionKey) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Produces placement decisions from telemetry snapshots.
pub struct DecisionMaker {
    config: EngineConfig,
    scorer: Scorer,
    cache: Mutex<DecisionCache>,
    last_created_at: Mutex<Option<DateTime<Utc>>>,
    log: Arc<dyn AppendLog<Decision>>,
    unflushed: tokio::sync::Mutex<VecDeque<Decision>>,
}

impl DecisionMaker {
    /// Create a decision maker with an empty history.
    ///
    /// `config` must already be validated.
    pub fn new(config: EngineConfig, log: Arc<dyn AppendLog<Decision>>) -> Self {
        let scorer = Scorer::new(config.weights, config.caps);
        let cache = DecisionCache::new(config.decision_cache_capacity);
        Self {
            config,
            scorer,
            cache: Mutex::new(cache),
            last_created_at: Mutex::new(None),
            log,
            unflushed: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }

    /// Create a decision maker and rebuild its history from the decision log.
    ///
    /// A log that fails to parse is returned as an error; callers treat it
    /// as fatal.
    pub async fn restore(
        config: EngineConfig,
        log: Arc<dyn AppendLog<Decision>>,
    ) -> EngineResult<Self> {
        let maker = Self::new(config, log);
        let history = maker.log.read_all().await?;
        let count = history.len();
        maker.replay(history);
        info!(decisions = count, "Restored decision history");
        Ok(maker)
    }

    /// Seed the idempotency cache from previously logged decisions.
    pub fn replay(&self, history: impl IntoIterator<Item = Decision>) {
        let mut cache = self.cache.lock();
        let mut last = self.last_created_at.lock();
        for decision in history {
            *last = Some(last.map_or(decision.created_at, |l| l.max(decision.created_at)));
            cache.insert(decision.key(), Some(decision));
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of remembered `(service, snapshot)` results.
    pub fn remembered(&self) -> usize {
        self.cache.lock().len()
    }

    /// Decisions whose log append has not yet succeeded.
    pub async fn unflushed(&self) -> usize {
        self.unflushed.lock().await.len()
    }

    /// Whether this `(service, snapshot)` was already evaluated.
    pub fn is_processed(&self, service: &str, snapshot_id: &SnapshotId) -> bool {
        self.cache
            .lock()
            .get(&(service.to_string(), snapshot_id.clone()))
            .is_some()
    }

    /// Mark `(service, snapshot)` keys as already handled, e.g. from tickets
    /// whose decision never reached the log. Known keys are left as they are.
    /// Returns how many keys were added.
    pub fn mark_processed(&self, keys: impl IntoIterator<Item = DecisionKey>) -> usize {
        let mut cache = self.cache.lock();
        let mut added = 0;
        for key in keys {
            if cache.get(&key).is_none() {
                cache.insert(key, None);
                added += 1;
            }
        }
        added
    }

    /// Drop the remembered result so the next evaluation recomputes it.
    /// Used when an emitted decision could not be acted on.
    pub fn forget(&self, service: &str, snapshot_id: &SnapshotId) {
        self.cache
            .lock()
            .remove(&(service.to_string(), snapshot_id.clone()));
    }

    /// Decide for one service and commit the result. Returns a decision only
    /// when it is actionable.
    pub async fn decide(
        &self,
        snapshot: &TelemetrySnapshot,
        assignment: &Assignment,
    ) -> Option<Decision> {
        match self.evaluate(snapshot, assignment).await {
            Evaluation::Emitted(decision) => {
                self.commit(&decision).await;
                Some(decision)
            }
            other => other.decision().cloned(),
        }
    }

    /// Append an emitted decision to the decision log.
    pub async fn commit(&self, decision: &Decision) {
        self.record(decision).await;
    }

    /// Evaluate one service, reporting why nothing was emitted.
    #[instrument(skip(self, snapshot), fields(snapshot_id = %snapshot.id, service = %assignment.service))]
    pub async fn evaluate(&self, snapshot: &TelemetrySnapshot, assignment: &Assignment) -> Evaluation {
        self.flush_unflushed().await;

        let key = (assignment.service.clone(), snapshot.id.clone());
        if let Some(previous) = self.cache.lock().get(&key).cloned() {
            debug!("Snapshot already evaluated for service");
            return Evaluation::Replayed(previous);
        }

        let outcome = self.compute(snapshot, assignment);
        match outcome {
            Ok(decision) => {
                self.cache.lock().insert(key, Some(decision.clone()));
                info!(
                    decision_id = %decision.id,
                    from = %decision.current_provider,
                    to = %decision.recommended_provider,
                    confidence = decision.confidence,
                    savings = decision.predicted_monthly_savings,
                    "Decision emitted"
                );
                Evaluation::Emitted(decision)
            }
            Err(reason) => {
                self.cache.lock().insert(key, None);
                debug!(reason = %reason, "No actionable decision");
                Evaluation::Dropped {
                    service: assignment.service.clone(),
                    reason,
                }
            }
        }
    }

    /// Score candidates and apply the emission rule. `Err` carries the reason
    /// nothing was emitted.
    fn compute(
        &self,
        snapshot: &TelemetrySnapshot,
        assignment: &Assignment,
    ) -> Result<Decision, String> {
        let service = &assignment.service;
        let telemetry = snapshot
            .service(service)
            .ok_or_else(|| format!("service {} not present in snapshot", service))?;

        if telemetry.providers.is_empty() {
            return Err(format!("no candidate providers for {}", service));
        }

        let ranked = self.scorer.rank(&telemetry.providers);
        let best = &ranked[0];
        let runner_up = ranked.get(1);

        if best.provider == assignment.provider {
            return Err(format!(
                "current provider {} already scores best ({:.3})",
                assignment.provider, best.total
            ));
        }

        let compared = [Some(best.provider.as_str()), runner_up.map(|s| s.provider.as_str())];
        let completeness = {
            let values: Vec<f64> = compared
                .iter()
                .flatten()
                .filter_map(|p| telemetry.providers.get(*p))
                .map(|m| m.completeness())
                .collect();
            values.iter().sum::<f64>() / values.len().max(1) as f64
        };

        let confidence = confidence(
            best.total,
            runner_up.map(|s| s.total),
            completeness,
            self.config.gap_saturation,
        );

        if confidence < self.config.confidence_threshold {
            return Err(format!(
                "confidence {:.2} below threshold {:.2}",
                confidence, self.config.confidence_threshold
            ));
        }

        let current_cost = telemetry
            .providers
            .get(&assignment.provider)
            .and_then(|m| m.usable_cost());
        let recommended_cost = telemetry.providers[&best.provider].usable_cost();

        let savings = match (current_cost, recommended_cost) {
            (Some(current), Some(recommended)) => {
                (current - recommended) * self.config.hours_per_month
            }
            _ => 0.0,
        };

        if savings < self.config.min_savings {
            return Err(format!(
                "predicted savings ${:.2}/month below ${:.2} floor",
                savings, self.config.min_savings
            ));
        }

        let current_total = ranked
            .iter()
            .find(|s| s.provider == assignment.provider)
            .map(|s| s.total);

        let explanation = match current_total {
            Some(current_total) => format!(
                "Recommended moving {} from {} to {} due to better cost/performance \
                 (score {:.2} vs {:.2}, confidence {:.0}%, ${:.2}/month)",
                service,
                assignment.provider,
                best.provider,
                best.total,
                current_total,
                confidence * 100.0,
                savings
            ),
            None => format!(
                "Recommended moving {} from {} to {} due to better cost/performance \
                 (score {:.2}, confidence {:.0}%, ${:.2}/month)",
                service,
                assignment.provider,
                best.provider,
                best.total,
                confidence * 100.0,
                savings
            ),
        };

        Ok(Decision {
            id: DecisionId::generate(),
            service: service.clone(),
            snapshot_id: snapshot.id.clone(),
            current_provider: assignment.provider.clone(),
            recommended_provider: best.provider.clone(),
            confidence,
            predicted_monthly_savings: savings,
            explanation,
            created_at: self.next_timestamp(),
            current_hourly_cost: current_cost,
            recommended_hourly_cost: recommended_cost,
            scores: ranked.clone(),
        })
    }

    /// Strictly increasing creation timestamps.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_created_at.lock();
        let now = Utc::now();
        let next = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }

    async fn record(&self, decision: &Decision) {
        let mut unflushed = self.unflushed.lock().await;
        if !unflushed.is_empty() {
            unflushed.push_back(decision.clone());
            self.trim_unflushed(&mut unflushed);
            return;
        }
        if let Err(e) = self.log.append(decision).await {
            warn!(
                decision_id = %decision.id,
                error = %e,
                "Decision log append failed, will retry"
            );
            unflushed.push_back(decision.clone());
        }
    }

    /// Retry queued appends in order, stopping at the first failure.
    pub async fn flush_unflushed(&self) {
        let mut unflushed = self.unflushed.lock().await;
        while let Some(decision) = unflushed.front() {
            match self.log.append(decision).await {
                Ok(()) => {
                    unflushed.pop_front();
                }
                Err(e) => {
                    debug!(
                        pending = unflushed.len(),
                        error = %e,
                        "Decision log still unavailable"
                    );
                    break;
                }
            }
        }
    }

    fn trim_unflushed(&self, unflushed: &mut VecDeque<Decision>) {
        while unflushed.len() > self.config.decision_cache_capacity {
            if let Some(dropped) = unflushed.pop_front() {
                warn!(
                    decision_id = %dropped.id,
                    "Unflushed decision queue full, oldest record not persisted"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use swen_ledger::{LedgerError, LedgerResult, MemoryLog};
    use swen_types::{ProviderMetrics, ServiceTelemetry};

    fn snapshot(id: &str, aws: ProviderMetrics, alibaba: ProviderMetrics) -> TelemetrySnapshot {
        let mut providers = BTreeMap::new();
        providers.insert("aws".to_string(), aws);
        providers.insert("alibaba".to_string(), alibaba);
        let mut services = BTreeMap::new();
        services.insert(
            "api".to_string(),
            ServiceTelemetry {
                current_provider: Some("aws".to_string()),
                providers,
            },
        );
        TelemetrySnapshot::new(SnapshotId::new(id), services)
    }

    fn reference(id: &str) -> TelemetrySnapshot {
        snapshot(
            id,
            ProviderMetrics::new(1.30, 85.0, 0.2, 1.0),
            ProviderMetrics::new(0.85, 100.0, 0.5, 0.8),
        )
    }

    fn maker() -> (DecisionMaker, Arc<MemoryLog<Decision>>) {
        let log = Arc::new(MemoryLog::<Decision>::new());
        (DecisionMaker::new(EngineConfig::default(), log.clone()), log)
    }

    #[tokio::test]
    async fn test_reference_decision_emitted() {
        let (maker, log) = maker();
        let decision = maker
            .decide(&reference("s1"), &Assignment::new("api", "aws"))
            .await
            .unwrap();

        assert_eq!(decision.recommended_provider, "alibaba");
        assert!((decision.confidence - 0.78125).abs() < 1e-9);
        assert!((decision.predicted_monthly_savings - 324.0).abs() < 1e-6);
        assert!(decision.explanation.contains("from aws to alibaba"));
        assert_eq!(log.records().len(), 1);
    }

    #[tokio::test]
    async fn test_same_snapshot_is_idempotent() {
        let (maker, log) = maker();
        let assignment = Assignment::new("api", "aws");
        let snap = reference("s1");

        let first = maker.evaluate(&snap, &assignment).await;
        maker.commit(first.decision().unwrap()).await;
        let second = maker.evaluate(&snap, &assignment).await;

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.decision(), second.decision());
        assert_eq!(log.records().len(), 1);
    }

    #[tokio::test]
    async fn test_current_provider_best_is_dropped() {
        let (maker, log) = maker();
        let evaluation = maker
            .evaluate(&reference("s1"), &Assignment::new("api", "alibaba"))
            .await;

        match evaluation {
            Evaluation::Dropped { reason, .. } => assert!(reason.contains("already scores best")),
            other => panic!("unexpected evaluation {:?}", other),
        }
        assert!(log.records().is_empty());
    }

    #[tokio::test]
    async fn test_low_confidence_is_dropped() {
        let (maker, _) = maker();
        let snap = snapshot(
            "s1",
            ProviderMetrics::new(1.00, 100.0, 0.5, 0.8),
            ProviderMetrics::new(0.80, 100.0, 0.5, 0.8),
        );
        let evaluation = maker.evaluate(&snap, &Assignment::new("api", "aws")).await;
        match evaluation {
            Evaluation::Dropped { reason, .. } => assert!(reason.contains("confidence")),
            other => panic!("unexpected evaluation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_small_savings_is_dropped() {
        let log = Arc::new(MemoryLog::<Decision>::new());
        let config = EngineConfig {
            min_savings: 1000.0,
            ..Default::default()
        };
        let maker = DecisionMaker::new(config, log);
        let evaluation = maker
            .evaluate(&reference("s1"), &Assignment::new("api", "aws"))
            .await;
        match evaluation {
            Evaluation::Dropped { reason, .. } => assert!(reason.contains("savings")),
            other => panic!("unexpected evaluation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_service_is_dropped() {
        let (maker, _) = maker();
        let evaluation = maker
            .evaluate(&reference("s1"), &Assignment::new("billing", "aws"))
            .await;
        assert!(matches!(evaluation, Evaluation::Dropped { .. }));
    }

    #[tokio::test]
    async fn test_created_at_strictly_increases() {
        let (maker, _) = maker();
        let assignment = Assignment::new("api", "aws");
        let mut last = None;
        for i in 0..5 {
            let d = maker
                .decide(&reference(&format!("s{}", i)), &assignment)
                .await
                .unwrap();
            if let Some(prev) = last {
                assert!(d.created_at > prev);
            }
            last = Some(d.created_at);
        }
    }

    #[tokio::test]
    async fn test_restore_rebuilds_cache() {
        let log = Arc::new(MemoryLog::<Decision>::new());
        let assignment = Assignment::new("api", "aws");
        let first = {
            let maker = DecisionMaker::new(EngineConfig::default(), log.clone());
            maker.decide(&reference("s1"), &assignment).await.unwrap()
        };

        let restored = DecisionMaker::restore(EngineConfig::default(), log.clone())
            .await
            .unwrap();
        assert!(restored.is_processed("api", &SnapshotId::new("s1")));

        let again = restored.evaluate(&reference("s1"), &assignment).await;
        assert_eq!(again, Evaluation::Replayed(Some(first)));
        assert_eq!(log.records().len(), 1);
    }

    #[tokio::test]
    async fn test_uncommitted_decision_is_not_logged_or_remembered() {
        let log = Arc::new(MemoryLog::<Decision>::new());
        let assignment = Assignment::new("api", "aws");
        {
            let maker = DecisionMaker::new(EngineConfig::default(), log.clone());
            assert!(maker.evaluate(&reference("s1"), &assignment).await.is_new());
        }
        assert!(log.records().is_empty());

        let restored = DecisionMaker::restore(EngineConfig::default(), log.clone())
            .await
            .unwrap();
        assert!(!restored.is_processed("api", &SnapshotId::new("s1")));
        assert!(restored.evaluate(&reference("s1"), &assignment).await.is_new());
    }

    #[tokio::test]
    async fn test_marked_keys_replay_without_decision() {
        let (maker, _) = maker();
        let added = maker.mark_processed([("api".to_string(), SnapshotId::new("s1"))]);
        assert_eq!(added, 1);

        let evaluation = maker
            .evaluate(&reference("s1"), &Assignment::new("api", "aws"))
            .await;
        assert_eq!(evaluation, Evaluation::Replayed(None));
        assert_eq!(
            maker.mark_processed([("api".to_string(), SnapshotId::new("s1"))]),
            0
        );
    }

    #[tokio::test]
    async fn test_forget_allows_reevaluation() {
        let (maker, _) = maker();
        let assignment = Assignment::new("api", "aws");
        assert!(maker.evaluate(&reference("s1"), &assignment).await.is_new());

        maker.forget("api", &SnapshotId::new("s1"));
        assert!(!maker.is_processed("api", &SnapshotId::new("s1")));
        assert!(maker.evaluate(&reference("s1"), &assignment).await.is_new());
    }

    /// Log that fails a fixed number of appends before succeeding.
    struct FlakyLog {
        failures_left: AtomicUsize,
        inner: MemoryLog<Decision>,
    }

    #[async_trait]
    impl AppendLog<Decision> for FlakyLog {
        async fn append(&self, record: &Decision) -> LedgerResult<()> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(LedgerError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk unavailable",
                )));
            }
            self.inner.append(record).await
        }

        async fn read_all(&self) -> LedgerResult<Vec<Decision>> {
            self.inner.read_all().await
        }

        async fn len(&self) -> LedgerResult<u64> {
            self.inner.len().await
        }
    }

    #[tokio::test]
    async fn test_failed_append_is_retried_in_order() {
        let log = Arc::new(FlakyLog {
            failures_left: AtomicUsize::new(1),
            inner: MemoryLog::new(),
        });
        let maker = DecisionMaker::new(EngineConfig::default(), log.clone());
        let assignment = Assignment::new("api", "aws");

        let first = maker.decide(&reference("s1"), &assignment).await.unwrap();
        assert_eq!(maker.unflushed().await, 1);
        assert!(log.inner.records().is_empty());

        let second = maker.decide(&reference("s2"), &assignment).await.unwrap();
        assert_eq!(maker.unflushed().await, 0);

        let ids: Vec<_> = log.inner.records().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}

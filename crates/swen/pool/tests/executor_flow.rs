//! Approved tickets flow through the executor worker and leave the pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use swen_pool::{
    ApplyOutcome, ChangeExecutor, ChangeTicketPool, ExecutorWorker, FileTicketStore, PoolConfig,
    TicketStore,
};
use swen_types::{ChangeTicket, DecisionId, TicketId, TicketState, Verdict, VerdictOutcome};

/// Succeeds for every service except the ones listed.
struct RecordingExecutor {
    fail_for: Vec<String>,
    applied: Mutex<Vec<String>>,
}

#[async_trait]
impl ChangeExecutor for RecordingExecutor {
    async fn apply(&self, ticket: &ChangeTicket) -> ApplyOutcome {
        self.applied.lock().push(ticket.service.clone());
        if self.fail_for.contains(&ticket.service) {
            ApplyOutcome::Failure("provider rejected request".into())
        } else {
            ApplyOutcome::Success
        }
    }
}

fn ticket(service: &str) -> ChangeTicket {
    let decision_id = DecisionId::generate();
    ChangeTicket {
        id: TicketId::generate(),
        decision_id: decision_id.clone(),
        service: service.into(),
        from_provider: "aws".into(),
        to_provider: "alibaba".into(),
        created_at: Utc::now(),
        snapshot_id: None,
        seq: 0,
        state: TicketState::Pending,
        verdict: Verdict::new(decision_id, VerdictOutcome::AutoApprove, vec![]),
        predicted_monthly_savings: 324.0,
        applied_at: None,
        updated_at: None,
        note: None,
    }
}

async fn wait_until_empty(pool: &ChangeTicketPool) {
    for _ in 0..200 {
        if pool.count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pool still holds {} tickets", pool.count());
}

#[tokio::test]
async fn approved_tickets_are_applied_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTicketStore::open(dir.path()).await.unwrap());
    let pool = Arc::new(ChangeTicketPool::new(PoolConfig::default(), store.clone()));
    let executor = Arc::new(RecordingExecutor {
        fail_for: vec!["db".into()],
        applied: Mutex::new(Vec::new()),
    });
    let worker = ExecutorWorker::spawn(pool.clone(), executor.clone());

    for service in ["api", "db"] {
        let t = ticket(service);
        let id = t.id.clone();
        assert!(pool.create(t).await.unwrap().is_created());
        pool.route(&id).await.unwrap();
    }

    wait_until_empty(&pool).await;

    let mut applied = executor.applied.lock().clone();
    applied.sort();
    assert_eq!(applied, vec!["api".to_string(), "db".to_string()]);

    assert!(store.load_all().await.unwrap().is_empty());

    worker.abort();
}

#[tokio::test]
async fn tickets_interrupted_mid_apply_finish_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTicketStore::open(dir.path()).await.unwrap());
    for service in ["a", "b", "c", "d", "e"] {
        let mut t = ticket(service);
        t.state = TicketState::Applying;
        store.put(&t).await.unwrap();
    }

    let pool = Arc::new(ChangeTicketPool::new(PoolConfig::default(), store.clone()));
    let executor = Arc::new(RecordingExecutor {
        fail_for: Vec::new(),
        applied: Mutex::new(Vec::new()),
    });
    let worker = ExecutorWorker::spawn(pool.clone(), executor.clone());

    let report = pool.restore().await.unwrap();
    assert_eq!(report.redispatched, 5);

    wait_until_empty(&pool).await;
    assert_eq!(executor.applied.lock().len(), 5);
    assert!(store.load_all().await.unwrap().is_empty());

    assert!(ExecutorWorker::drain(&pool, worker, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn drain_lets_received_tickets_finish() {
    let pool = Arc::new(ChangeTicketPool::new(
        PoolConfig::default(),
        Arc::new(swen_pool::InMemoryTicketStore::new()),
    ));
    let executor = Arc::new(RecordingExecutor {
        fail_for: Vec::new(),
        applied: Mutex::new(Vec::new()),
    });
    let worker = ExecutorWorker::spawn(pool.clone(), executor.clone());

    let t = ticket("api");
    let id = t.id.clone();
    pool.create(t).await.unwrap();
    pool.route(&id).await.unwrap();

    assert!(ExecutorWorker::drain(&pool, worker, Duration::from_secs(5)).await);
    assert_eq!(pool.count(), 0);
    assert_eq!(executor.applied.lock().as_slice(), ["api".to_string()]);
}

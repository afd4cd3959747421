//! Operator requests for a running daemon.
//!
//! While swend owns the state directory, `swend tickets approve|reject|evict`
//! cannot touch the pool. Instead the request is written to the control
//! directory as one JSON file (tmp + rename, so a reader never sees half a
//! request) and the owning process applies it on its next poll. Requests
//! are applied in submission order and removed once applied or refused.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swen_pool::{ChangeTicketPool, PoolResult};
use swen_types::{ChangeTicket, TicketId};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DaemonResult;

/// Operator resolution of one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TicketAction {
    Approve,
    Reject { reason: String },
    Evict,
}

impl TicketAction {
    pub async fn apply(&self, pool: &ChangeTicketPool, id: &TicketId) -> PoolResult<ChangeTicket> {
        match self {
            TicketAction::Approve => pool.approve(id).await,
            TicketAction::Reject { reason } => pool.reject(id, reason).await,
            TicketAction::Evict => pool.force_evict(id).await,
        }
    }
}

impl std::fmt::Display for TicketAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketAction::Approve => write!(f, "approve"),
            TicketAction::Reject { .. } => write!(f, "reject"),
            TicketAction::Evict => write!(f, "evict"),
        }
    }
}

/// A queued action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub id: Uuid,
    pub ticket_id: TicketId,
    #[serde(flatten)]
    pub action: TicketAction,
    pub submitted_at: DateTime<Utc>,
}

impl ControlRequest {
    pub fn new(ticket_id: TicketId, action: TicketAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            action,
            submitted_at: Utc::now(),
        }
    }

    fn file_name(&self) -> String {
        format!(
            "{}-{}.json",
            self.submitted_at.format("%Y%m%dT%H%M%S%.9f"),
            self.id
        )
    }
}

/// What became of one drained request.
#[derive(Debug, Clone)]
pub struct ControlOutcome {
    pub request: ControlRequest,
    pub result: Result<ChangeTicket, String>,
}

/// Directory of pending requests.
#[derive(Debug, Clone)]
pub struct ControlInbox {
    dir: PathBuf,
}

impl ControlInbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queue a request for the owning process.
    pub async fn submit(&self, request: &ControlRequest) -> DaemonResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(request.file_name());
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(request)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    /// Requests not yet applied, oldest first. Never modifies the inbox.
    pub async fn pending(&self) -> DaemonResult<Vec<ControlRequest>> {
        let mut requests = Vec::new();
        for path in self.request_files().await? {
            if let Some(request) = read_request(&path).await? {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    /// Apply every queued request to `pool` and remove it from the inbox.
    pub async fn drain(&self, pool: &ChangeTicketPool) -> DaemonResult<Vec<ControlOutcome>> {
        let mut outcomes = Vec::new();
        for path in self.request_files().await? {
            let Some(request) = read_request(&path).await? else {
                remove(&path).await?;
                continue;
            };

            let result = request
                .action
                .apply(pool, &request.ticket_id)
                .await
                .map_err(|e| e.to_string());
            match &result {
                Ok(ticket) => info!(
                    ticket_id = %request.ticket_id,
                    action = %request.action,
                    state = %ticket.state,
                    "Applied operator request"
                ),
                Err(e) => warn!(
                    ticket_id = %request.ticket_id,
                    action = %request.action,
                    error = %e,
                    "Operator request refused"
                ),
            }
            remove(&path).await?;
            outcomes.push(ControlOutcome { request, result });
        }
        Ok(outcomes)
    }

    async fn request_files(&self) -> DaemonResult<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// `None` for a request that vanished or cannot be parsed.
async fn read_request(path: &Path) -> DaemonResult<Option<ControlRequest>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_slice(&bytes) {
        Ok(request) => Ok(Some(request)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Discarding unreadable operator request");
            Ok(None)
        }
    }
}

async fn remove(path: &Path) -> DaemonResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use swen_pool::{InMemoryTicketStore, PoolConfig};
    use swen_types::{DecisionId, TicketState, Verdict, VerdictOutcome};

    fn ticket(service: &str) -> ChangeTicket {
        let decision_id = DecisionId::generate();
        ChangeTicket {
            id: TicketId::generate(),
            decision_id: decision_id.clone(),
            service: service.into(),
            from_provider: "aws".into(),
            to_provider: "gcp".into(),
            created_at: Utc::now(),
            snapshot_id: None,
            seq: 0,
            state: TicketState::Pending,
            verdict: Verdict::new(decision_id, VerdictOutcome::ManualReview, vec![]),
            predicted_monthly_savings: 50.0,
            applied_at: None,
            updated_at: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_requests_apply_in_order_and_leave_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = ControlInbox::new(dir.path().join("control"));
        let pool = ChangeTicketPool::new(PoolConfig::default(), Arc::new(InMemoryTicketStore::new()));
        let api = ticket("api");
        let db = ticket("db");
        pool.create(api.clone()).await.unwrap();
        pool.create(db.clone()).await.unwrap();

        inbox
            .submit(&ControlRequest::new(api.id.clone(), TicketAction::Approve))
            .await
            .unwrap();
        inbox
            .submit(&ControlRequest::new(db.id.clone(), TicketAction::Evict))
            .await
            .unwrap();
        inbox
            .submit(&ControlRequest::new(db.id.clone(), TicketAction::Evict))
            .await
            .unwrap();
        assert_eq!(inbox.pending().await.unwrap().len(), 3);

        let outcomes = inbox.drain(&pool).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].result.as_ref().unwrap().state, TicketState::Approved);
        assert_eq!(outcomes[1].result.as_ref().unwrap().state, TicketState::Expired);
        assert!(outcomes[2].result.is_err());

        assert!(inbox.pending().await.unwrap().is_empty());
        assert_eq!(pool.get(&api.id).unwrap().state, TicketState::Approved);
        assert!(pool.get(&db.id).is_none());
    }

    #[tokio::test]
    async fn test_unreadable_request_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = ControlInbox::new(dir.path());
        tokio::fs::write(dir.path().join("0-bad.json"), b"{not json").await.unwrap();
        let pool = ChangeTicketPool::new(PoolConfig::default(), Arc::new(InMemoryTicketStore::new()));

        assert!(inbox.drain(&pool).await.unwrap().is_empty());
        assert!(!dir.path().join("0-bad.json").exists());
    }

    #[tokio::test]
    async fn test_missing_inbox_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = ControlInbox::new(dir.path().join("absent"));
        assert!(inbox.pending().await.unwrap().is_empty());
    }
}

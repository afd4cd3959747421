//! Ticket persistence.
//!
//! The pool holds tickets in memory and mirrors every change through a
//! [`TicketStore`]. Stores only see whole tickets: a `put` replaces the
//! previous record and a `delete` drops a ticket that reached a terminal
//! state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use swen_types::{ChangeTicket, TicketId};
use tracing::debug;

use crate::error::{PoolError, PoolResult};

/// Key-value store for open tickets.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert or replace a ticket.
    async fn put(&self, ticket: &ChangeTicket) -> PoolResult<()>;

    /// Remove a ticket. Removing a missing ticket is not an error.
    async fn delete(&self, id: &TicketId) -> PoolResult<()>;

    /// Load every stored ticket.
    async fn load_all(&self) -> PoolResult<Vec<ChangeTicket>>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<HashMap<TicketId, ChangeTicket>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. to simulate state left by a previous run.
    pub fn with_tickets(tickets: impl IntoIterator<Item = ChangeTicket>) -> Self {
        Self {
            tickets: RwLock::new(tickets.into_iter().map(|t| (t.id.clone(), t)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.tickets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.read().is_empty()
    }

    pub fn get(&self, id: &TicketId) -> Option<ChangeTicket> {
        self.tickets.read().get(id).cloned()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn put(&self, ticket: &ChangeTicket) -> PoolResult<()> {
        self.tickets.write().insert(ticket.id.clone(), ticket.clone());
        Ok(())
    }

    async fn delete(&self, id: &TicketId) -> PoolResult<()> {
        self.tickets.write().remove(id);
        Ok(())
    }

    async fn load_all(&self) -> PoolResult<Vec<ChangeTicket>> {
        Ok(self.tickets.read().values().cloned().collect())
    }
}

/// One JSON file per ticket under a directory.
///
/// Writes go to `<id>.tmp` and are renamed over `<id>.json`, so a crash
/// leaves either the old or the new record, never a partial one.
pub struct FileTicketStore {
    dir: PathBuf,
}

impl FileTicketStore {
    /// Open (or create) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> PoolResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Opened ticket store");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, id: &TicketId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_uuid()))
    }
}

#[async_trait]
impl TicketStore for FileTicketStore {
    async fn put(&self, ticket: &ChangeTicket) -> PoolResult<()> {
        let path = self.file_for(&ticket.id);
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(ticket)?;

        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| PoolError::Store(format!("write {}: {}", tmp_path.display(), e)))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| PoolError::Store(format!("rename {}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn delete(&self, id: &TicketId) -> PoolResult<()> {
        match tokio::fs::remove_file(self.file_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PoolError::Store(format!("delete {}: {}", id, e))),
        }
    }

    async fn load_all(&self) -> PoolResult<Vec<ChangeTicket>> {
        let mut tickets = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some("json") => {}
                Some("tmp") => {
                    // Interrupted write; the previous record (if any) is intact.
                    debug!(path = %path.display(), "Ignoring leftover temp file");
                    continue;
                }
                _ => continue,
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                // Deleted by the owning process since the directory was listed.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let ticket: ChangeTicket =
                serde_json::from_slice(&bytes).map_err(|e| PoolError::Corrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            tickets.push(ticket);
        }

        Ok(tickets)
    }
}

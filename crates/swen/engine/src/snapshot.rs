//! Snapshot publication.
//!
//! The latest telemetry snapshot is published by swapping an `Arc`. Readers
//! clone the pointer and keep a complete snapshot for as long as they need
//! it; a concurrent publish never exposes a partially built snapshot.

use std::sync::Arc;

use parking_lot::RwLock;
use swen_types::TelemetrySnapshot;

/// Holder for the most recently published snapshot.
#[derive(Default)]
pub struct SnapshotCell {
    current: RwLock<Option<Arc<TelemetrySnapshot>>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new snapshot, returning the one it replaced.
    pub fn publish(&self, snapshot: TelemetrySnapshot) -> Option<Arc<TelemetrySnapshot>> {
        let next = Arc::new(snapshot);
        std::mem::replace(&mut *self.current.write(), Some(next))
    }

    /// Current snapshot, if any has been published.
    pub fn load(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.current.read().clone()
    }
}

//! Telemetry acquisition.
//!
//! The feed itself is external; this module turns whatever the feed last
//! wrote into an immutable [`TelemetrySnapshot`]. Two document shapes are
//! accepted:
//!
//! - a serialized `TelemetrySnapshot` (`{"id": ..., "services": {...}}`)
//! - the flat feed shape, one object per service with a `current_provider`
//!   field and one object per provider:
//!   `{"api": {"current_provider": "aws", "aws": {"cost": 1.3, "latency": 85, ...}}}`
//!
//! A flat document carries no identifier, so its snapshot id is the SHA-256
//! of its canonical JSON. Re-reading an unchanged document yields the same
//! id, which keeps the decision maker idempotent across polls and restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use swen_types::{ProviderMetrics, ServiceTelemetry, SnapshotId, TelemetrySnapshot};
use tracing::{debug, instrument};

use crate::error::{EngineError, EngineResult};

/// Source of telemetry snapshots.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Read the latest complete snapshot.
    async fn read_snapshot(&self) -> EngineResult<TelemetrySnapshot>;
}

/// Reads the latest telemetry document from a file.
pub struct FileTelemetrySource {
    path: PathBuf,
}

impl FileTelemetrySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Age of the telemetry file, used by freshness probes.
    pub async fn age(&self) -> EngineResult<std::time::Duration> {
        let modified = tokio::fs::metadata(&self.path).await?.modified()?;
        Ok(modified.elapsed().unwrap_or_default())
    }
}

#[async_trait]
impl TelemetrySource for FileTelemetrySource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn read_snapshot(&self) -> EngineResult<TelemetrySnapshot> {
        let bytes = tokio::fs::read(&self.path).await?;
        let snapshot = parse_snapshot(&bytes)?;
        debug!(
            snapshot_id = %snapshot.id,
            services = snapshot.services.len(),
            "Read telemetry snapshot"
        );
        Ok(snapshot)
    }
}

/// In-memory source, replaced wholesale by `set`.
#[derive(Default)]
pub struct StaticTelemetrySource {
    snapshot: RwLock<Option<TelemetrySnapshot>>,
}

impl StaticTelemetrySource {
    pub fn new(snapshot: TelemetrySnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
        }
    }

    pub fn set(&self, snapshot: TelemetrySnapshot) {
        *self.snapshot.write() = Some(snapshot);
    }
}

#[async_trait]
impl TelemetrySource for StaticTelemetrySource {
    async fn read_snapshot(&self) -> EngineResult<TelemetrySnapshot> {
        self.snapshot
            .read()
            .clone()
            .ok_or_else(|| EngineError::Telemetry("no snapshot available".to_string()))
    }
}

/// Parse a telemetry document in either accepted shape.
pub fn parse_snapshot(bytes: &[u8]) -> EngineResult<TelemetrySnapshot> {
    let value: Value = serde_json::from_slice(bytes)?;
    let root = value
        .as_object()
        .ok_or_else(|| EngineError::Telemetry("document root must be an object".to_string()))?;

    if root.contains_key("id") && root.get("services").map(Value::is_object) == Some(true) {
        return Ok(serde_json::from_value(value)?);
    }

    let id = SnapshotId::new(content_hash(&value)?);
    let mut services = BTreeMap::new();
    let mut latest: Option<DateTime<Utc>> = None;

    for (service, entry) in root {
        let Some(entry) = entry.as_object() else {
            continue;
        };
        let (telemetry, observed) = parse_service(entry);
        if let Some(observed) = observed {
            latest = Some(latest.map_or(observed, |l| l.max(observed)));
        }
        services.insert(service.clone(), telemetry);
    }

    if services.is_empty() {
        return Err(EngineError::Telemetry(
            "document contains no services".to_string(),
        ));
    }

    Ok(TelemetrySnapshot {
        id,
        observed_at: latest.unwrap_or_else(Utc::now),
        services,
    })
}

fn parse_service(entry: &Map<String, Value>) -> (ServiceTelemetry, Option<DateTime<Utc>>) {
    let current_provider = entry
        .get("current_provider")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut providers = BTreeMap::new();
    let mut latest = None;

    for (provider, data) in entry {
        let Some(data) = data.as_object() else {
            continue;
        };
        let metrics = ProviderMetrics {
            cost: number(data, &["cost"]),
            latency_ms: number(data, &["latency_ms", "latency"]),
            credit_balance: number(data, &["credit_balance", "credits"]),
            available_capacity: number(data, &["available_capacity", "available_gpus"]),
        };
        if let Some(ts) = data
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            let ts = ts.with_timezone(&Utc);
            latest = Some(latest.map_or(ts, |l: DateTime<Utc>| l.max(ts)));
        }
        providers.insert(provider.clone(), metrics);
    }

    (
        ServiceTelemetry {
            current_provider,
            providers,
        },
        latest,
    )
}

fn number(data: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|k| data.get(*k))
        .and_then(Value::as_f64)
}

fn content_hash(value: &Value) -> EngineResult<String> {
    let canonical = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"{
        "api": {
            "current_provider": "aws",
            "aws": {"cost": 1.30, "latency": 85.0, "credits": 0.2, "available_gpus": 1, "region": "us-east-1"},
            "alibaba": {"cost": 0.85, "latency": 100.0, "credits": 0.5, "available_gpus": 0.8,
                        "timestamp": "2026-01-05T10:00:00+00:00"}
        }
    }"#;

    #[test]
    fn test_parse_flat_feed() {
        let snapshot = parse_snapshot(FEED.as_bytes()).unwrap();
        let api = snapshot.service("api").unwrap();

        assert_eq!(api.current_provider.as_deref(), Some("aws"));
        assert_eq!(api.providers.len(), 2);
        assert_eq!(api.providers["aws"].latency_ms, Some(85.0));
        assert_eq!(api.providers["alibaba"].available_capacity, Some(0.8));
        assert_eq!(
            snapshot.observed_at.to_rfc3339(),
            "2026-01-05T10:00:00+00:00"
        );
    }

    #[test]
    fn test_content_hash_is_stable_across_formatting() {
        let compact: Value = serde_json::from_str(FEED).unwrap();
        let a = parse_snapshot(FEED.as_bytes()).unwrap();
        let b = parse_snapshot(serde_json::to_string(&compact).unwrap().as_bytes()).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.as_str().len(), 64);
    }

    #[test]
    fn test_native_shape_round_trips() {
        let snapshot = parse_snapshot(FEED.as_bytes()).unwrap();
        let json = serde_json::to_vec(&snapshot).unwrap();
        let parsed = parse_snapshot(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_non_object_root_rejected() {
        assert!(matches!(
            parse_snapshot(b"[1, 2]"),
            Err(EngineError::Telemetry(_))
        ));
        assert!(matches!(
            parse_snapshot(b"{not json"),
            Err(EngineError::TelemetryParse(_))
        ));
    }

    #[tokio::test]
    async fn test_file_source_reads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest_telemetry.json");
        std::fs::write(&path, FEED).unwrap();

        let source = FileTelemetrySource::new(&path);
        let snapshot = source.read_snapshot().await.unwrap();
        assert!(snapshot.service("api").is_some());
        assert!(source.age().await.unwrap() < std::time::Duration::from_secs(60));
    }
}

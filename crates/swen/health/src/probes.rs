//! Typed health probes.
//!
//! Each managed subsystem has one [`Probe`] that answers Healthy or
//! Degraded. The loop never inspects processes directly; how liveness is
//! determined is up to the probe (HTTP ping, file freshness, internal
//! state query).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swen_pool::ChangeTicketPool;
use swen_types::HealthStatus;
use tracing::{debug, instrument};

/// Result of a probe execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: HealthStatus,

    /// Detail for degraded results.
    pub message: Option<String>,

    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            latency_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn degraded(message: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            latency_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::degraded(format!("Probe timed out after {}ms", timeout_ms), timeout_ms)
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

/// Liveness check for one subsystem.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> ProbeResult;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// GETs a URL; any 2xx response is healthy.
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn probe(&self) -> ProbeResult {
        let start = Instant::now();
        let result = self.client.get(&self.url).send().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(resp) if resp.status().is_success() => ProbeResult::healthy(latency_ms),
            Ok(resp) => ProbeResult::degraded(format!("HTTP {}", resp.status()), latency_ms),
            Err(e) if e.is_timeout() => ProbeResult::timeout(latency_ms),
            Err(e) => ProbeResult::degraded(format!("request failed: {}", e), latency_ms),
        }
    }

    fn describe(&self) -> String {
        format!("http {}", self.url)
    }
}

/// Healthy while a file was modified within `max_age`.
pub struct FileFreshnessProbe {
    path: PathBuf,
    max_age: Duration,
}

impl FileFreshnessProbe {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }
}

#[async_trait]
impl Probe for FileFreshnessProbe {
    async fn probe(&self) -> ProbeResult {
        let start = Instant::now();
        let modified = match tokio::fs::metadata(&self.path).await.and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                return ProbeResult::degraded(
                    format!("{} unreadable: {}", self.path.display(), e),
                    start.elapsed().as_millis() as u64,
                )
            }
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        let latency_ms = start.elapsed().as_millis() as u64;
        debug!(path = %self.path.display(), age_secs = age.as_secs(), "File freshness probed");

        if age > self.max_age {
            ProbeResult::degraded(
                format!(
                    "{} is {}s old (max {}s)",
                    self.path.display(),
                    age.as_secs(),
                    self.max_age.as_secs()
                ),
                latency_ms,
            )
        } else {
            ProbeResult::healthy(latency_ms)
        }
    }

    fn describe(&self) -> String {
        format!("file {} fresher than {}s", self.path.display(), self.max_age.as_secs())
    }
}

/// Pool health: within bound and no stale tickets.
pub struct PoolProbe {
    pool: Arc<ChangeTicketPool>,
}

impl PoolProbe {
    pub fn new(pool: Arc<ChangeTicketPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Probe for PoolProbe {
    async fn probe(&self) -> ProbeResult {
        let count = self.pool.count();
        let max = self.pool.config().max_tickets;
        let stale = self.pool.stale_tickets();

        if count > max {
            ProbeResult::degraded(format!("{} open tickets exceed limit {}", count, max), 0)
        } else if !stale.is_empty() {
            let services: Vec<&str> = stale.iter().map(|t| t.service.as_str()).collect();
            ProbeResult::degraded(
                format!(
                    "{} stale tickets unresolved ({})",
                    stale.len(),
                    services.join(", ")
                ),
                0,
            )
        } else {
            ProbeResult::healthy(0)
        }
    }

    fn describe(&self) -> String {
        "ticket pool".to_string()
    }
}

/// Probe backed by a closure, for wiring internal state checks.
pub struct FnProbe<F> {
    name: String,
    check: F,
}

impl<F> FnProbe<F>
where
    F: Fn() -> Result<(), String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

#[async_trait]
impl<F> Probe for FnProbe<F>
where
    F: Fn() -> Result<(), String> + Send + Sync,
{
    async fn probe(&self) -> ProbeResult {
        match (self.check)() {
            Ok(()) => ProbeResult::healthy(0),
            Err(msg) => ProbeResult::degraded(msg, 0),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swen_pool::{InMemoryTicketStore, PoolConfig};

    #[tokio::test]
    async fn test_file_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest_telemetry.json");

        let probe = FileFreshnessProbe::new(&path, Duration::from_secs(300));
        let missing = probe.probe().await;
        assert!(!missing.is_healthy());
        assert!(missing.message.unwrap().contains("unreadable"));

        std::fs::write(&path, b"{}").unwrap();
        assert!(probe.probe().await.is_healthy());

        let strict = FileFreshnessProbe::new(&path, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(20));
        assert!(!strict.probe().await.is_healthy());
    }

    #[tokio::test]
    async fn test_empty_pool_is_healthy() {
        let pool = Arc::new(ChangeTicketPool::new(
            PoolConfig::default(),
            Arc::new(InMemoryTicketStore::new()),
        ));
        assert!(PoolProbe::new(pool).probe().await.is_healthy());
    }

    #[tokio::test]
    async fn test_fn_probe() {
        let probe = FnProbe::new("flag", || Err("flag down".to_string()));
        let result = probe.probe().await;
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.message.as_deref(), Some("flag down"));
    }

    #[tokio::test]
    async fn test_http_probe_unreachable_is_degraded() {
        let probe = HttpProbe::new("http://127.0.0.1:9/healthz", Duration::from_millis(200));
        assert!(!probe.probe().await.is_healthy());
    }
}

//! Configuration for swend.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then `SWEN_*` environment variables with `__` between sections
//! (`SWEN_POOL__MAX_TICKETS=8`).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swen_engine::EngineConfig;
use swen_health::HealthLoopConfig;
use swen_policy::{PolicyGate, PolicyRule, PolicyRuleSet, PolicyThresholds, ServiceProfile};
use swen_pool::{BackoffConfig, PoolConfig};

use crate::error::{DaemonError, DaemonResult};

/// Main daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwenConfig {
    /// Ticket pool bounds
    #[serde(default)]
    pub pool: PoolConfig,

    /// Scoring and decision making
    #[serde(default)]
    pub engine: EngineConfig,

    /// Admission control
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Per-service catalog used to build ticket metadata
    #[serde(default)]
    pub services: BTreeMap<String, ServiceProfile>,

    /// Health and remediation loop
    #[serde(default)]
    pub health: HealthLoopConfig,

    /// Decision cycle
    #[serde(default)]
    pub cycle: CycleConfig,

    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Change proposal delivery
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Policy configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub thresholds: PolicyThresholds,

    /// Explicit rules. When absent the standard rules are derived from
    /// `thresholds`.
    #[serde(default)]
    pub rules: Option<Vec<PolicyRule>>,
}

impl PolicyConfig {
    pub fn rule_set(&self) -> DaemonResult<PolicyRuleSet> {
        match &self.rules {
            Some(rules) => Ok(PolicyRuleSet::new(rules.clone())?),
            None => {
                self.thresholds.validate()?;
                Ok(PolicyRuleSet::from_thresholds(&self.thresholds))
            }
        }
    }

    pub fn gate(&self) -> DaemonResult<PolicyGate> {
        Ok(PolicyGate::new(self.rule_set()?)?)
    }
}

/// Decision cycle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Seconds between decision cycles
    #[serde(default = "default_cycle_interval")]
    pub interval_secs: u64,

    /// Seconds between checks for operator requests
    #[serde(default = "default_control_poll")]
    pub control_poll_secs: u64,

    /// Seconds to let in-progress applies finish at shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cycle_interval(),
            control_poll_secs: default_control_poll(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl CycleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn control_poll(&self) -> Duration {
        Duration::from_secs(self.control_poll_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// File locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for tickets, logs and the proposal outbox
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Latest telemetry document written by the feed
    #[serde(default = "default_telemetry_path")]
    pub telemetry: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            telemetry: default_telemetry_path(),
        }
    }
}

impl PathsConfig {
    pub fn decision_log(&self) -> PathBuf {
        self.state_dir.join("decisions.jsonl")
    }

    pub fn health_log(&self) -> PathBuf {
        self.state_dir.join("health.jsonl")
    }

    pub fn ticket_history(&self) -> PathBuf {
        self.state_dir.join("ticket_history.jsonl")
    }

    pub fn tickets_dir(&self) -> PathBuf {
        self.state_dir.join("tickets")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.state_dir.join("outbox")
    }

    /// Operator requests queued for the running daemon
    pub fn control_dir(&self) -> PathBuf {
        self.state_dir.join("control")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.state_dir.join("swend.lock")
    }
}

/// Change proposal delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Write a proposal file per created ticket
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_cycle_interval() -> u64 {
    30
}

fn default_control_poll() -> u64 {
    2
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./swen-state")
}

fn default_telemetry_path() -> PathBuf {
    PathBuf::from("./latest_telemetry.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SwenConfig {
    /// Load and validate configuration.
    pub fn load(path: Option<&str>) -> DaemonResult<Self> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&SwenConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with SWEN_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("SWEN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: SwenConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml(source: &str) -> DaemonResult<Self> {
        let config: SwenConfig =
            toml::from_str(source).map_err(|e| DaemonError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configuration the components would refuse at runtime.
    pub fn validate(&self) -> DaemonResult<()> {
        self.engine.validate()?;
        self.pool.validate()?;
        self.policy.rule_set()?;

        if self.notify.backoff.max_attempts == 0 {
            return Err(DaemonError::Config(
                "notify.backoff.max_attempts must be at least 1".to_string(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for subsystem in &self.health.subsystems {
            if subsystem.name == crate::runtime::POOL_SUBSYSTEM || !names.insert(&subsystem.name) {
                return Err(DaemonError::Config(format!(
                    "duplicate health subsystem: {}",
                    subsystem.name
                )));
            }
        }
        Ok(())
    }

    /// Profile for `service`, or the default profile when uncatalogued.
    pub fn service_profile(&self, service: &str) -> ServiceProfile {
        self.services.get(service).cloned().unwrap_or_default()
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> DaemonResult<String> {
        toml::to_string_pretty(self).map_err(|e| DaemonError::Config(e.to_string()))
    }
}

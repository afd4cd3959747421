//! Health loop configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::monitor::Subsystem;
use crate::probes::{FileFreshnessProbe, HttpProbe};
use crate::remediation::CommandRemediator;

/// Configuration for the health and remediation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthLoopConfig {
    /// Seconds between cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Remediation attempts per degraded subsystem per cycle.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout for each probe and each remediation attempt.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Managed subsystems.
    #[serde(default)]
    pub subsystems: Vec<SubsystemConfig>,
}

impl Default for HealthLoopConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            subsystems: Vec::new(),
        }
    }
}

impl HealthLoopConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.max(1))
    }
}

/// One managed subsystem as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsystemConfig {
    pub name: String,
    pub probe: ProbeConfig,

    #[serde(default)]
    pub remediation: RemediationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeConfig {
    /// GET the URL, healthy on 2xx.
    Http { url: String },
    /// Healthy while the file is younger than `max_age_secs`.
    FileFresh { path: PathBuf, max_age_secs: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemediationConfig {
    /// Run a command (restart script, service manager call).
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Report only.
    #[default]
    None,
}

impl SubsystemConfig {
    /// Build the runtime subsystem. Probe timeouts use `probe_timeout`.
    pub fn build(&self, probe_timeout: Duration) -> Subsystem {
        let probe: Arc<dyn crate::probes::Probe> = match &self.probe {
            ProbeConfig::Http { url } => Arc::new(HttpProbe::new(url.clone(), probe_timeout)),
            ProbeConfig::FileFresh { path, max_age_secs } => Arc::new(FileFreshnessProbe::new(
                path.clone(),
                Duration::from_secs(*max_age_secs),
            )),
        };

        let subsystem = Subsystem::new(self.name.clone(), probe);
        match &self.remediation {
            RemediationConfig::Command { program, args } => subsystem.with_remediator(Arc::new(
                CommandRemediator::new(self.name.clone(), program.clone(), args.clone()),
            )),
            RemediationConfig::None => subsystem,
        }
    }
}

// Default value helpers
fn default_interval_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout_secs() -> u64 {
    30
}

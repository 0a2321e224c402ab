//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Shared primitives and utilities for the core runtime."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use thiserror::Error;
use tracing::debug;

use crate::logging::LogFormat;

/// Name of this component; also the name of the lock record.
pub const COMPONENT_NAME: &str = "cluster-version-operator";

/// Namespace holding the lock record.
pub const LOCK_NAMESPACE: &str = "kube-system";

fn default_lease_duration() -> Duration {
    Duration::from_secs(90)
}

fn default_renew_deadline() -> Duration {
    Duration::from_secs(45)
}

fn default_retry_period() -> Duration {
    Duration::from_secs(30)
}

fn default_jitter_factor() -> f64 {
    1.2
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse configuration: {0}")]
    ParseInline(#[from] toml::de::Error),
    #[error("invalid election timing: {0}")]
    InvalidElection(String),
}

/// Primary configuration object for the operator process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default)]
    pub election: ElectionConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub client: ClientSettings,
}

impl OperatorConfig {
    pub const ENV_CONFIG_PATH: &'static str = "CVO_CONFIG";

    /// Load configuration, preferring an explicit path, then `CVO_CONFIG`.
    ///
    /// Without either the built-in defaults are used; they reproduce the
    /// 90s/45s/30s lease timings against `kube-system/cluster-version-operator`.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(Path::new(&env_path));
            }
        }
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str::<OperatorConfig>(&contents).map_err(|source| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.election.validate()
    }
}

impl std::str::FromStr for OperatorConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: OperatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Lease timings. Immutable for the lifetime of a run.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElectionConfig {
    /// How long a lease stays valid after its last renewal.
    #[serde(default = "default_lease_duration")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub lease_duration: Duration,
    /// How long the leader keeps retrying a renewal before giving up.
    #[serde(default = "default_renew_deadline")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub renew_deadline: Duration,
    /// Interval between acquisition or renewal attempts.
    #[serde(default = "default_retry_period")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retry_period: Duration,
    /// Upper bound multiplier applied to the acquisition retry interval.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// Hand the lease back on shutdown instead of letting it expire.
    #[serde(default)]
    pub release_on_cancel: bool,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lease_duration: default_lease_duration(),
            renew_deadline: default_renew_deadline(),
            retry_period: default_retry_period(),
            jitter_factor: default_jitter_factor(),
            release_on_cancel: false,
        }
    }
}

impl ElectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lease_duration.is_zero()
            || self.renew_deadline.is_zero()
            || self.retry_period.is_zero()
        {
            return Err(ConfigError::InvalidElection(
                "lease_duration, renew_deadline and retry_period must be positive".into(),
            ));
        }
        if !self.jitter_factor.is_finite() || self.jitter_factor < 1.0 {
            return Err(ConfigError::InvalidElection(format!(
                "jitter_factor must be at least 1.0, got {}",
                self.jitter_factor
            )));
        }
        if self.lease_duration <= self.renew_deadline {
            return Err(ConfigError::InvalidElection(format!(
                "lease_duration ({:?}) must be greater than renew_deadline ({:?})",
                self.lease_duration, self.renew_deadline
            )));
        }
        let jittered_retry = self.retry_period.mul_f64(self.jitter_factor);
        if self.renew_deadline <= jittered_retry {
            return Err(ConfigError::InvalidElection(format!(
                "renew_deadline ({:?}) must be greater than jitter_factor * retry_period ({:?})",
                self.renew_deadline, jittered_retry
            )));
        }
        Ok(())
    }

    /// Lease duration as stored in the shared record.
    pub fn lease_duration_seconds(&self) -> u64 {
        self.lease_duration.as_secs().max(1)
    }
}

/// Lock record settings. The record itself always lives at
/// `LOCK_NAMESPACE/COMPONENT_NAME`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Publish leadership transitions as cluster events in addition to logs.
    #[serde(default)]
    pub emit_events: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Directory for a daily rolling JSON log; stdout only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            directory: None,
            file_prefix: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Upper bound for a single request against the cluster API.
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

//! Runtime configuration loaded from JSON.
//!
//! ```json
//! {
//!   "service_calls": [{
//!     "name": "orders",
//!     "discovery": { "type": "caching", "ttl_ms": 5000,
//!                    "delegate": { "type": "static", "servers": ["orders@10.0.0.1:8080"] } },
//!     "filter": { "type": "blacklist", "servers": ["orders@10.0.0.9:8080"] },
//!     "chooser": "round-robin",
//!     "load_balancer": { "max_attempts": 3, "exclude_tried": true }
//!   }],
//!   "health": { "exposure_level": "full", "exclude_pattern": "legacy-*" }
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use lodestar_core::{DefinitionParseError, HealthState, ServiceDefinition};
use serde::{Deserialize, Serialize};

use crate::balancer::LoadBalancerConfig;
use crate::health::ExposureLevel;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors raised while loading, validating or wiring configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid server spec in service call '{service}': {source}")]
    InvalidServer {
        service: String,
        #[source]
        source: DefinitionParseError,
    },

    #[error("unknown {kind} reference '{name}' in service call '{service}'")]
    UnknownRef {
        service: String,
        kind: &'static str,
        name: String,
    },

    #[error("duplicate service call '{name}'")]
    DuplicateServiceCall { name: String },

    /// `service` is the service call name, or `health` for health settings.
    #[error("invalid value for '{field}' in '{service}': {message}")]
    InvalidValue {
        service: String,
        field: &'static str,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Pipeline component configuration
// ---------------------------------------------------------------------------

fn default_ttl_ms() -> u64 {
    60_000
}

/// Which discovery a service call uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DiscoveryConfig {
    /// Fixed servers; each entry is a `name@host:port` spec or a comma-separated list.
    Static {
        #[serde(default)]
        servers: Vec<String>,
    },
    Caching {
        #[serde(default = "default_ttl_ms")]
        ttl_ms: u64,
        delegate: Box<DiscoveryConfig>,
    },
    Aggregating { delegates: Vec<DiscoveryConfig> },
    /// A discovery registered on the factory under this name.
    Custom {
        #[serde(rename = "ref")]
        reference: String,
    },
}

/// Which filter a service call uses. Defaults to `healthy`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FilterConfig {
    #[default]
    Healthy,
    #[serde(alias = "passthrough")]
    PassThrough,
    Blacklist {
        #[serde(default)]
        servers: Vec<String>,
    },
    Chained { filters: Vec<FilterConfig> },
    Custom {
        #[serde(rename = "ref")]
        reference: String,
    },
}

/// Which chooser a service call uses, written as a bare string.
///
/// `roundrobin` / `round-robin` and `random` are built in (case-insensitive);
/// any other name refers to a chooser registered on the factory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChooserConfig {
    #[default]
    RoundRobin,
    Random,
    Custom(String),
}

impl FromStr for ChooserConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        match name.to_ascii_lowercase().as_str() {
            "" => Err("chooser name must not be empty".to_string()),
            "roundrobin" | "round-robin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            _ => Ok(Self::Custom(name.to_string())),
        }
    }
}

impl TryFrom<String> for ChooserConfig {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChooserConfig> for String {
    fn from(value: ChooserConfig) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ChooserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => f.write_str("round-robin"),
            Self::Random => f.write_str("random"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// One load-balanced service call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCallConfig {
    /// Service name passed to discovery and used to name the balancer.
    pub name: String,
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub chooser: ChooserConfig,
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,
}

impl ServiceCallConfig {
    /// A call over static servers with every other component at its default.
    #[must_use]
    pub fn with_static_servers(name: impl Into<String>, servers: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            discovery: DiscoveryConfig::Static {
                servers: vec![servers.into()],
            },
            filter: FilterConfig::default(),
            chooser: ChooserConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
        }
    }

    /// Checks values that can be verified without the factory's named instances.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("name", "must not be empty"));
        }
        if self.load_balancer.max_attempts == 0 {
            return Err(self.invalid("load_balancer.max_attempts", "must be at least 1"));
        }
        self.validate_discovery(&self.discovery)?;
        self.validate_filter(&self.filter)
    }

    fn validate_discovery(&self, discovery: &DiscoveryConfig) -> Result<(), ConfigError> {
        match discovery {
            DiscoveryConfig::Static { servers } => self.parse_servers(servers).map(|_| ()),
            DiscoveryConfig::Caching { ttl_ms, delegate } => {
                if *ttl_ms == 0 {
                    return Err(self.invalid("discovery.ttl_ms", "must be positive"));
                }
                self.validate_discovery(delegate)
            }
            DiscoveryConfig::Aggregating { delegates } => {
                if delegates.is_empty() {
                    return Err(self.invalid("discovery.delegates", "must not be empty"));
                }
                delegates.iter().try_for_each(|d| self.validate_discovery(d))
            }
            DiscoveryConfig::Custom { .. } => Ok(()),
        }
    }

    fn validate_filter(&self, filter: &FilterConfig) -> Result<(), ConfigError> {
        match filter {
            FilterConfig::Blacklist { servers } => self.parse_servers(servers).map(|_| ()),
            FilterConfig::Chained { filters } => {
                filters.iter().try_for_each(|f| self.validate_filter(f))
            }
            FilterConfig::Healthy | FilterConfig::PassThrough | FilterConfig::Custom { .. } => {
                Ok(())
            }
        }
    }

    /// Parses server spec entries, each of which may be a comma-separated list.
    pub(crate) fn parse_servers(
        &self,
        servers: &[String],
    ) -> Result<Vec<ServiceDefinition>, ConfigError> {
        let mut parsed = Vec::new();
        for entry in servers {
            let definitions =
                ServiceDefinition::parse_list(entry).map_err(|source| ConfigError::InvalidServer {
                    service: self.name.clone(),
                    source,
                })?;
            parsed.extend(definitions);
        }
        Ok(parsed)
    }

    fn invalid(&self, field: &'static str, message: &str) -> ConfigError {
        ConfigError::InvalidValue {
            service: self.name.clone(),
            field,
            message: message.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// HealthConfig
// ---------------------------------------------------------------------------

/// Settings of the health check registry and the periodic health service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    /// Comma-separated id/group patterns of checks to skip.
    pub exclude_pattern: Option<String>,
    pub exposure_level: ExposureLevel,
    /// State reported by checks until the context has started.
    pub initial_state: HealthState,
    pub poll_interval_ms: u64,
    /// Register a discovery health check for every configured service call.
    pub discovery_checks: bool,
}

impl HealthConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude_pattern: None,
            exposure_level: ExposureLevel::Default,
            initial_state: HealthState::Down,
            poll_interval_ms: 30_000,
            discovery_checks: true,
        }
    }
}

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

/// Top-level configuration of a runtime context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub service_calls: Vec<ServiceCallConfig>,
    pub health: HealthConfig,
}

impl RuntimeConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or missing fields,
    /// or the first validation error.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Validates the health settings and every service call, and rejects
    /// duplicate service call names.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                service: "health".to_string(),
                field: "poll_interval_ms",
                message: "must be positive".to_string(),
            });
        }
        let mut names = HashSet::new();
        for call in &self.service_calls {
            if !names.insert(call.name.as_str()) {
                return Err(ConfigError::DuplicateServiceCall {
                    name: call.name.clone(),
                });
            }
            call.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn service_call(&self, name: &str) -> Option<&ServiceCallConfig> {
        self.service_calls.iter().find(|c| c.name == name)
    }
}

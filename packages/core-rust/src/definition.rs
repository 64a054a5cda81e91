//! Service definitions and the `name@host:port` server-spec grammar.
//!
//! A [`ServiceDefinition`] is the unit every discovery strategy produces and
//! every filter/chooser consumes. It is immutable once built: the builder-style
//! `with_*` methods consume and return a new value.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors from parsing a `name@host:port` server spec.
///
/// Every variant carries the offending token so configuration errors can be
/// traced back to the exact entry of a bulk list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionParseError {
    #[error("missing '@' separator in server spec '{token}'")]
    MissingSeparator { token: String },
    #[error("missing ':' port separator in server spec '{token}'")]
    MissingPort { token: String },
    #[error("empty service name in server spec '{token}'")]
    EmptyName { token: String },
    #[error("empty host in server spec '{token}'")]
    EmptyHost { token: String },
    #[error("invalid port '{port}' in server spec '{token}'")]
    InvalidPort { token: String, port: String },
}

// ---------------------------------------------------------------------------
// ServiceDefinition
// ---------------------------------------------------------------------------

/// A discovered network endpoint for a logical service.
///
/// Equality and hashing use `(name, host, port)` only. Metadata and the
/// health flag describe the endpoint but do not change its identity, so a
/// blacklist entry parsed from text matches a discovered definition that
/// carries extra metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    name: String,
    host: String,
    port: u16,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default = "default_healthy")]
    healthy: bool,
}

fn default_healthy() -> bool {
    true
}

impl ServiceDefinition {
    /// Creates a healthy definition with empty metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            metadata: BTreeMap::new(),
            healthy: true,
        }
    }

    /// Parses a single `name@host:port` spec.
    ///
    /// The token is split on the first `@` into name and address, and the
    /// address on its last `:` into host and port, so bracketed IPv6 hosts
    /// such as `svc@[::1]:8080` parse with host `[::1]`.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionParseError`] naming the token when a separator
    /// is missing, the name or host is empty, or the port is not a `u16`.
    pub fn parse(spec: &str) -> Result<Self, DefinitionParseError> {
        let token = spec.trim();

        let Some((name, address)) = token.split_once('@') else {
            return Err(DefinitionParseError::MissingSeparator {
                token: token.to_string(),
            });
        };
        let Some((host, port)) = address.rsplit_once(':') else {
            return Err(DefinitionParseError::MissingPort {
                token: token.to_string(),
            });
        };

        let name = name.trim();
        let host = host.trim();
        let port = port.trim();

        if name.is_empty() {
            return Err(DefinitionParseError::EmptyName {
                token: token.to_string(),
            });
        }
        if host.is_empty() {
            return Err(DefinitionParseError::EmptyHost {
                token: token.to_string(),
            });
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| DefinitionParseError::InvalidPort {
                token: token.to_string(),
                port: port.to_string(),
            })?;

        Ok(Self::new(name, host, port))
    }

    /// Parses a comma-separated list of specs.
    ///
    /// Entries are trimmed and empty entries are skipped. Parsing stops at the
    /// first malformed entry.
    ///
    /// # Errors
    ///
    /// Returns the [`DefinitionParseError`] of the first malformed entry.
    pub fn parse_list(specs: &str) -> Result<Vec<Self>, DefinitionParseError> {
        specs
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Returns a copy with the given metadata entry added.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns a copy with the given health flag.
    #[must_use]
    pub fn with_health(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Returns `host:port`, the form connectors consume.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for ServiceDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.host == other.host && self.port == other.port
    }
}

impl Eq for ServiceDefinition {}

impl Hash for ServiceDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.host, self.port)
    }
}

impl FromStr for ServiceDefinition {
    type Err = DefinitionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Health check vocabulary: states, results, options, and the check contracts.
//!
//! Checks are invoked once per call; scheduling and aggregation live in the
//! runtime crate. A [`HealthCheckResult`] is immutable and is built through
//! [`HealthCheckResultBuilder`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// HealthState
// ---------------------------------------------------------------------------

/// Reported state of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    Up,
    Down,
    Unknown,
}

impl HealthState {
    /// Returns the upper-case wire name (`UP`, `DOWN`, `UNKNOWN`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown health state: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Options and configuration
// ---------------------------------------------------------------------------

/// Which probe an invocation serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthCheckKind {
    #[default]
    All,
    Readiness,
    Liveness,
}

/// Per-invocation options handed to [`HealthCheck::call`].
#[derive(Debug, Clone)]
pub struct HealthCheckOptions {
    pub kind: HealthCheckKind,
    /// State reported by checks that have not completed a real evaluation yet.
    pub initial_state: HealthState,
    /// Whether the owning context has finished starting.
    pub context_started: bool,
    /// Free-form parameters from the caller (e.g. query parameters of a probe).
    pub params: BTreeMap<String, String>,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self {
            kind: HealthCheckKind::All,
            initial_state: HealthState::Down,
            context_started: true,
            params: BTreeMap::new(),
        }
    }
}

/// Static configuration of a single check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthCheckConfiguration {
    /// Disabled checks are skipped by aggregation and report UNKNOWN if called.
    pub enabled: bool,
    /// Consecutive failures required before DOWN becomes visible. 0 reports DOWN at once.
    pub failure_threshold: u32,
    /// Consecutive successes required to leave DOWN. 0 reports UP at once.
    pub success_threshold: u32,
}

impl Default for HealthCheckConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 0,
            success_threshold: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// HealthCheckResult
// ---------------------------------------------------------------------------

/// Immutable outcome of one check invocation.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    check_id: String,
    group: Option<String>,
    state: HealthState,
    message: Option<String>,
    error: Option<Arc<anyhow::Error>>,
    details: BTreeMap<String, serde_json::Value>,
}

impl HealthCheckResult {
    /// Starts a builder for the given check. The builder defaults to UNKNOWN.
    #[must_use]
    pub fn builder(check: &dyn HealthCheck) -> HealthCheckResultBuilder {
        HealthCheckResultBuilder::new(check.id(), check.group())
    }

    #[must_use]
    pub fn check_id(&self) -> &str {
        &self.check_id
    }

    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> HealthState {
        self.state
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn details(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.details
    }
}

/// Mutable builder for [`HealthCheckResult`].
///
/// Probes receive a `&mut HealthCheckResultBuilder` and set the state,
/// message, error and details they observed.
#[derive(Debug, Clone)]
pub struct HealthCheckResultBuilder {
    check_id: String,
    group: Option<String>,
    state: HealthState,
    message: Option<String>,
    error: Option<Arc<anyhow::Error>>,
    details: BTreeMap<String, serde_json::Value>,
}

impl HealthCheckResultBuilder {
    #[must_use]
    pub fn new(check_id: impl Into<String>, group: Option<&str>) -> Self {
        Self {
            check_id: check_id.into(),
            group: group.map(str::to_string),
            state: HealthState::Unknown,
            message: None,
            error: None,
            details: BTreeMap::new(),
        }
    }

    pub fn up(&mut self) -> &mut Self {
        self.state(HealthState::Up)
    }

    pub fn down(&mut self) -> &mut Self {
        self.state(HealthState::Down)
    }

    pub fn unknown(&mut self) -> &mut Self {
        self.state(HealthState::Unknown)
    }

    pub fn state(&mut self, state: HealthState) -> &mut Self {
        self.state = state;
        self
    }

    pub fn message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    pub fn error(&mut self, error: anyhow::Error) -> &mut Self {
        self.error = Some(Arc::new(error));
        self
    }

    pub fn detail(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> &mut Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns the state set so far.
    #[must_use]
    pub fn current_state(&self) -> HealthState {
        self.state
    }

    #[must_use]
    pub fn build(&self) -> HealthCheckResult {
        HealthCheckResult {
            check_id: self.check_id.clone(),
            group: self.group.clone(),
            state: self.state,
            message: self.message.clone(),
            error: self.error.clone(),
            details: self.details.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// HealthCheck and HealthCheckRepository
// ---------------------------------------------------------------------------

/// A named, invokable probe.
///
/// `call` is expected to catch its own failures and encode them as a DOWN
/// result with the error attached. An `Err` from `call` means the check
/// itself misbehaved; aggregation helpers abort the whole batch on it.
pub trait HealthCheck: Send + Sync {
    fn id(&self) -> &str;

    fn group(&self) -> Option<&str> {
        None
    }

    fn configuration(&self) -> &HealthCheckConfiguration;

    fn is_enabled(&self) -> bool {
        self.configuration().enabled
    }

    fn is_readiness(&self) -> bool {
        true
    }

    fn is_liveness(&self) -> bool {
        true
    }

    /// Sort key for aggregation; lower runs first.
    fn order(&self) -> i32 {
        i32::MAX
    }

    /// Runs the check once.
    ///
    /// # Errors
    ///
    /// Returns an error only when the check cannot produce a result at all.
    fn call(&self, options: &HealthCheckOptions) -> anyhow::Result<HealthCheckResult>;
}

/// A source of checks that are registered and unregistered as a unit.
pub trait HealthCheckRepository: Send + Sync {
    fn id(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Returns the checks this repository currently provides.
    fn checks(&self) -> Vec<Arc<dyn HealthCheck>>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Building blocks for writing health checks.
//!
//! [`ProbeHealthCheck`] turns a fallible probe closure into a full
//! [`HealthCheck`]: it handles the enabled flag, the not-yet-started
//! context, error capture and failure/success thresholds, so probe authors
//! only describe what they observe.

use std::sync::Arc;

use lodestar_core::{
    HealthCheck, HealthCheckConfiguration, HealthCheckOptions, HealthCheckRepository,
    HealthCheckResult, HealthCheckResultBuilder, HealthState, ServiceDiscovery,
};
use parking_lot::Mutex;
use tracing::debug;

type Probe =
    dyn Fn(&mut HealthCheckResultBuilder, &HealthCheckOptions) -> anyhow::Result<()> + Send + Sync;

// ---------------------------------------------------------------------------
// ProbeHealthCheck
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    invocations: u64,
    /// Consecutive failures.
    failures: u64,
    /// Consecutive successes.
    successes: u64,
    /// Last state reported to callers.
    reported: Option<HealthState>,
}

/// A health check driven by a probe closure.
///
/// The probe sets state, message and details on the builder. Returning `Err`
/// reports DOWN with the error attached. Thresholds smooth flapping: with
/// `failure_threshold = n`, DOWN becomes visible on the n-th consecutive
/// failure; with `success_threshold = n`, leaving DOWN needs n consecutive
/// successes.
pub struct ProbeHealthCheck {
    id: String,
    group: Option<String>,
    configuration: HealthCheckConfiguration,
    readiness: bool,
    liveness: bool,
    order: i32,
    probe: Box<Probe>,
    counters: Mutex<Counters>,
}

impl ProbeHealthCheck {
    #[must_use]
    pub fn builder(id: impl Into<String>) -> ProbeHealthCheckBuilder {
        ProbeHealthCheckBuilder {
            id: id.into(),
            group: None,
            configuration: HealthCheckConfiguration::default(),
            readiness: true,
            liveness: true,
            order: i32::MAX,
        }
    }

    /// Applies thresholds to the probe's raw state and updates counters.
    fn settle(&self, builder: &mut HealthCheckResultBuilder) {
        let mut counters = self.counters.lock();
        counters.invocations += 1;

        let observed = builder.current_state();
        let visible = match observed {
            HealthState::Down => {
                counters.failures += 1;
                counters.successes = 0;
                let threshold = u64::from(self.configuration.failure_threshold);
                if threshold > 0 && counters.failures < threshold {
                    counters.reported.unwrap_or(HealthState::Up)
                } else {
                    HealthState::Down
                }
            }
            HealthState::Up => {
                counters.successes += 1;
                counters.failures = 0;
                let threshold = u64::from(self.configuration.success_threshold);
                if threshold > 0
                    && counters.reported == Some(HealthState::Down)
                    && counters.successes < threshold
                {
                    HealthState::Down
                } else {
                    HealthState::Up
                }
            }
            HealthState::Unknown => HealthState::Unknown,
        };

        if visible != observed {
            debug!(check = %self.id, %observed, %visible, "threshold held previous state");
        }
        counters.reported = Some(visible);
        builder
            .state(visible)
            .detail("invocation.count", counters.invocations)
            .detail("failure.count", counters.failures)
            .detail("success.count", counters.successes);
    }
}

impl HealthCheck for ProbeHealthCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    fn configuration(&self) -> &HealthCheckConfiguration {
        &self.configuration
    }

    fn is_readiness(&self) -> bool {
        self.readiness
    }

    fn is_liveness(&self) -> bool {
        self.liveness
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn call(&self, options: &HealthCheckOptions) -> anyhow::Result<HealthCheckResult> {
        let mut builder = HealthCheckResult::builder(self);

        if !self.is_enabled() {
            builder.unknown().message("Disabled");
            return Ok(builder.build());
        }
        if !options.context_started {
            builder.state(options.initial_state);
            return Ok(builder.build());
        }

        if let Err(err) = (self.probe)(&mut builder, options) {
            builder.down().error(err);
        }
        self.settle(&mut builder);
        Ok(builder.build())
    }
}

/// Builder for [`ProbeHealthCheck`].
#[derive(Debug, Clone)]
pub struct ProbeHealthCheckBuilder {
    id: String,
    group: Option<String>,
    configuration: HealthCheckConfiguration,
    readiness: bool,
    liveness: bool,
    order: i32,
}

impl ProbeHealthCheckBuilder {
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn configuration(mut self, configuration: HealthCheckConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    #[must_use]
    pub fn readiness(mut self, readiness: bool) -> Self {
        self.readiness = readiness;
        self
    }

    #[must_use]
    pub fn liveness(mut self, liveness: bool) -> Self {
        self.liveness = liveness;
        self
    }

    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn build<P>(self, probe: P) -> ProbeHealthCheck
    where
        P: Fn(&mut HealthCheckResultBuilder, &HealthCheckOptions) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        ProbeHealthCheck {
            id: self.id,
            group: self.group,
            configuration: self.configuration,
            readiness: self.readiness,
            liveness: self.liveness,
            order: self.order,
            probe: Box::new(probe),
            counters: Mutex::new(Counters::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticHealthCheckRepository
// ---------------------------------------------------------------------------

/// Repository over a fixed list of checks.
pub struct StaticHealthCheckRepository {
    id: String,
    enabled: bool,
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl StaticHealthCheckRepository {
    #[must_use]
    pub fn new(id: impl Into<String>, checks: Vec<Arc<dyn HealthCheck>>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            checks,
        }
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl HealthCheckRepository for StaticHealthCheckRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn checks(&self) -> Vec<Arc<dyn HealthCheck>> {
        self.checks.clone()
    }
}

// ---------------------------------------------------------------------------
// ServiceDiscoveryHealthCheck
// ---------------------------------------------------------------------------

/// Reports whether a discovery currently knows any endpoint of a service.
///
/// UP with an `instances` detail when at least one definition is returned,
/// DOWN when the list is empty or the discovery fails.
pub struct ServiceDiscoveryHealthCheck {
    inner: ProbeHealthCheck,
}

impl ServiceDiscoveryHealthCheck {
    /// Creates a check with id `discovery:<service_name>` in group `discovery`.
    #[must_use]
    pub fn new(service_name: impl Into<String>, discovery: Arc<dyn ServiceDiscovery>) -> Self {
        Self::with_configuration(service_name, discovery, HealthCheckConfiguration::default())
    }

    #[must_use]
    pub fn with_configuration(
        service_name: impl Into<String>,
        discovery: Arc<dyn ServiceDiscovery>,
        configuration: HealthCheckConfiguration,
    ) -> Self {
        let service_name = service_name.into();
        let inner = ProbeHealthCheck::builder(format!("discovery:{service_name}"))
            .group("discovery")
            .configuration(configuration)
            .build(move |builder, _options| {
                let services = discovery.services(&service_name)?;
                builder.detail("service.name", service_name.as_str());
                builder.detail("instances", services.len());
                if services.is_empty() {
                    builder.down().message("no instances available");
                } else {
                    builder.up();
                }
                Ok(())
            });
        Self { inner }
    }
}

impl HealthCheck for ServiceDiscoveryHealthCheck {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn group(&self) -> Option<&str> {
        self.inner.group()
    }

    fn configuration(&self) -> &HealthCheckConfiguration {
        self.inner.configuration()
    }

    fn call(&self, options: &HealthCheckOptions) -> anyhow::Result<HealthCheckResult> {
        self.inner.call(options)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

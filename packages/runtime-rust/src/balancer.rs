//! Load-balanced dispatch: discovery -> filter -> chooser -> operation.
//!
//! One dispatch runs entirely on the caller's thread. An operation asks for
//! another candidate by returning [`CallOutcome::Retry`]; each retry picks
//! from the same filtered list with the already tried candidates removed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lodestar_core::{
    ChooseError, DiscoveryError, ServiceChooser, ServiceDefinition, ServiceDiscovery,
    ServiceFilter,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::lifecycle::{ManagedService, ServiceContext};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a dispatched operation wants the balancer to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The call is complete; the dispatch returns the chosen endpoint.
    Done,
    /// Try another candidate.
    Retry,
}

/// Retry policy of a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Upper bound on operation invocations per dispatch, including the first.
    pub max_attempts: u32,
    /// Whether a retry may pick an endpoint already tried in this dispatch.
    pub exclude_tried: bool,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            exclude_tried: true,
        }
    }
}

/// Errors surfaced by a dispatch.
#[derive(Debug, thiserror::Error)]
pub enum LoadBalancerError {
    #[error("load balancer for service '{service}' is not started")]
    NotStarted { service: String },

    #[error("no services available for '{service}'")]
    NoServices { service: String },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Choose(#[from] ChooseError),

    #[error("retries exhausted for service '{service}' after {attempts} attempt(s)")]
    RetriesExhausted { service: String, attempts: u32 },

    #[error("operation on '{instance}' failed for service '{service}': {source}")]
    Operation {
        service: String,
        instance: String,
        #[source]
        source: anyhow::Error,
    },
}

impl LoadBalancerError {
    /// Short label used for the `outcome` metric label.
    fn outcome_label(&self) -> &'static str {
        match self {
            Self::NotStarted { .. } => "not_started",
            Self::NoServices { .. } => "no_services",
            Self::Discovery(_) => "discovery_error",
            Self::Choose(_) => "choose_error",
            Self::RetriesExhausted { .. } => "exhausted",
            Self::Operation { .. } => "operation_error",
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceLoadBalancer trait
// ---------------------------------------------------------------------------

/// Dispatches an operation to one endpoint of a logical service.
pub trait ServiceLoadBalancer: Send + Sync {
    /// Runs `operation` against a chosen endpoint, retrying on
    /// [`CallOutcome::Retry`]. Returns the endpoint that completed the call.
    ///
    /// # Errors
    ///
    /// See [`LoadBalancerError`]. An operation `Err` propagates immediately
    /// without retry.
    fn process(
        &self,
        service_name: &str,
        operation: &mut dyn FnMut(&ServiceDefinition) -> anyhow::Result<CallOutcome>,
    ) -> Result<ServiceDefinition, LoadBalancerError>;
}

// ---------------------------------------------------------------------------
// DefaultServiceLoadBalancer
// ---------------------------------------------------------------------------

/// Load balancer over a discovery, an optional filter and a chooser.
///
/// Components are fixed at construction. Dispatch is refused until
/// [`start`](Self::start) and again after [`stop`](Self::stop).
pub struct DefaultServiceLoadBalancer {
    name: String,
    discovery: Arc<dyn ServiceDiscovery>,
    filter: Option<Arc<dyn ServiceFilter>>,
    chooser: Arc<dyn ServiceChooser>,
    config: LoadBalancerConfig,
    started: AtomicBool,
}

impl DefaultServiceLoadBalancer {
    /// Creates a stopped balancer. `name` identifies it as a managed service.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        discovery: Arc<dyn ServiceDiscovery>,
        filter: Option<Arc<dyn ServiceFilter>>,
        chooser: Arc<dyn ServiceChooser>,
        config: LoadBalancerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            discovery,
            filter,
            chooser,
            config,
            started: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            info!(balancer = %self.name, "load balancer started");
        }
    }

    pub fn stop(&self) {
        if self.started.swap(false, Ordering::AcqRel) {
            info!(balancer = %self.name, "load balancer stopped");
        }
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn config(&self) -> &LoadBalancerConfig {
        &self.config
    }

    #[must_use]
    pub fn discovery(&self) -> &Arc<dyn ServiceDiscovery> {
        &self.discovery
    }

    fn dispatch(
        &self,
        service_name: &str,
        operation: &mut dyn FnMut(&ServiceDefinition) -> anyhow::Result<CallOutcome>,
    ) -> Result<(ServiceDefinition, u32), LoadBalancerError> {
        if !self.is_started() {
            return Err(LoadBalancerError::NotStarted {
                service: service_name.to_string(),
            });
        }

        let discovered = self.discovery.services(service_name)?;
        let mut candidates = match &self.filter {
            Some(filter) => filter.apply(&discovered),
            None => discovered,
        };
        if candidates.is_empty() {
            return Err(LoadBalancerError::NoServices {
                service: service_name.to_string(),
            });
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let chosen = self.chooser.choose(service_name, &candidates)?.clone();

            match operation(&chosen) {
                Ok(CallOutcome::Done) => return Ok((chosen, attempts)),
                Ok(CallOutcome::Retry) => {
                    debug!(
                        service = service_name,
                        instance = %chosen,
                        attempt = attempts,
                        "operation requested retry"
                    );
                    if self.config.exclude_tried {
                        candidates.retain(|candidate| candidate != &chosen);
                    }
                    if attempts >= max_attempts || candidates.is_empty() {
                        return Err(LoadBalancerError::RetriesExhausted {
                            service: service_name.to_string(),
                            attempts,
                        });
                    }
                }
                Err(source) => {
                    return Err(LoadBalancerError::Operation {
                        service: service_name.to_string(),
                        instance: chosen.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

impl ServiceLoadBalancer for DefaultServiceLoadBalancer {
    fn process(
        &self,
        service_name: &str,
        operation: &mut dyn FnMut(&ServiceDefinition) -> anyhow::Result<CallOutcome>,
    ) -> Result<ServiceDefinition, LoadBalancerError> {
        let span = info_span!(
            "dispatch",
            service = service_name,
            attempts = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let _entered = span.enter();

        let result = self.dispatch(service_name, operation);
        let outcome = match &result {
            Ok((chosen, attempts)) => {
                span.record("attempts", *attempts);
                debug!(service = service_name, instance = %chosen, "dispatch complete");
                "ok"
            }
            Err(err) => {
                warn!(service = service_name, error = %err, "dispatch failed");
                err.outcome_label()
            }
        };
        span.record("outcome", outcome);
        metrics::counter!(
            "lodestar_dispatch_total",
            "service" => service_name.to_string(),
            "outcome" => outcome
        )
        .increment(1);

        result.map(|(chosen, _)| chosen)
    }
}

#[async_trait]
impl ManagedService for DefaultServiceLoadBalancer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        self.start();
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        self.stop();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

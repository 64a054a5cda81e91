//! Builds load balancers from [`ServiceCallConfig`] entries.
//!
//! Built-in components are created from their configuration; `custom`
//! references and unknown chooser names resolve against instances
//! registered on the factory by name.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use lodestar_core::{ServiceChooser, ServiceDiscovery, ServiceFilter};
use tracing::{debug, info};

use crate::balancer::DefaultServiceLoadBalancer;
use crate::chooser::{RandomServiceChooser, RoundRobinServiceChooser};
use crate::config::{
    ChooserConfig, ConfigError, DiscoveryConfig, FilterConfig, RuntimeConfig, ServiceCallConfig,
};
use crate::discovery::{
    AggregatingServiceDiscovery, CachingServiceDiscovery, StaticServiceDiscovery,
};
use crate::filter::{
    BlacklistServiceFilter, ChainedServiceFilter, HealthyServiceFilter, PassThroughServiceFilter,
};
use crate::health::{HealthCheckRegistry, ServiceDiscoveryHealthCheck};
use crate::lifecycle::ServiceRegistry;

/// Prefix of the managed-service name of every built balancer.
pub const BALANCER_NAME_PREFIX: &str = "service-call:";

/// Assembles discovery/filter/chooser pipelines from configuration.
#[derive(Default)]
pub struct ServiceCallFactory {
    discoveries: HashMap<String, Arc<dyn ServiceDiscovery>>,
    filters: HashMap<String, Arc<dyn ServiceFilter>>,
    choosers: HashMap<String, Arc<dyn ServiceChooser>>,
}

impl ServiceCallFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_discovery(
        &mut self,
        name: impl Into<String>,
        discovery: Arc<dyn ServiceDiscovery>,
    ) {
        self.discoveries.insert(name.into(), discovery);
    }

    pub fn register_filter(&mut self, name: impl Into<String>, filter: Arc<dyn ServiceFilter>) {
        self.filters.insert(name.into(), filter);
    }

    pub fn register_chooser(&mut self, name: impl Into<String>, chooser: Arc<dyn ServiceChooser>) {
        self.choosers.insert(name.into(), chooser);
    }

    #[must_use]
    pub fn with_discovery(
        mut self,
        name: impl Into<String>,
        discovery: Arc<dyn ServiceDiscovery>,
    ) -> Self {
        self.register_discovery(name, discovery);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, filter: Arc<dyn ServiceFilter>) -> Self {
        self.register_filter(name, filter);
        self
    }

    #[must_use]
    pub fn with_chooser(
        mut self,
        name: impl Into<String>,
        chooser: Arc<dyn ServiceChooser>,
    ) -> Self {
        self.register_chooser(name, chooser);
        self
    }

    /// Builds a stopped balancer named `service-call:<name>`.
    ///
    /// # Errors
    ///
    /// Returns a validation error, [`ConfigError::InvalidServer`] for a bad
    /// server spec, or [`ConfigError::UnknownRef`] for an unregistered name.
    pub fn build(
        &self,
        call: &ServiceCallConfig,
    ) -> Result<DefaultServiceLoadBalancer, ConfigError> {
        call.validate()?;
        let discovery = self.build_discovery(call, &call.discovery)?;
        let filter = self.build_filter(call, &call.filter)?;
        let chooser = self.build_chooser(call)?;

        debug!(service = %call.name, chooser = %call.chooser, "built service call");
        Ok(DefaultServiceLoadBalancer::new(
            format!("{BALANCER_NAME_PREFIX}{}", call.name),
            discovery,
            Some(filter),
            chooser,
            call.load_balancer.clone(),
        ))
    }

    /// Builds one balancer per configured service call, keyed by call name.
    ///
    /// # Errors
    ///
    /// Returns the first configuration or build error.
    pub fn build_all(
        &self,
        config: &RuntimeConfig,
    ) -> Result<BTreeMap<String, Arc<DefaultServiceLoadBalancer>>, ConfigError> {
        config.validate()?;
        config
            .service_calls
            .iter()
            .map(|call| Ok((call.name.clone(), Arc::new(self.build(call)?))))
            .collect()
    }

    /// Builds every service call, registers the balancers as managed services
    /// and, when enabled, a discovery health check per call.
    ///
    /// # Errors
    ///
    /// As [`build_all`](Self::build_all); nothing is registered on error.
    pub fn install(
        &self,
        config: &RuntimeConfig,
        services: &ServiceRegistry,
        health: &HealthCheckRegistry,
    ) -> Result<BTreeMap<String, Arc<DefaultServiceLoadBalancer>>, ConfigError> {
        let balancers = self.build_all(config)?;
        for (name, balancer) in &balancers {
            services.register_arc(Arc::clone(balancer));
            if config.health.discovery_checks {
                health.register_check(Arc::new(ServiceDiscoveryHealthCheck::new(
                    name.as_str(),
                    Arc::clone(balancer.discovery()),
                )));
            }
        }
        info!(count = balancers.len(), "service calls installed");
        Ok(balancers)
    }

    fn build_discovery(
        &self,
        call: &ServiceCallConfig,
        config: &DiscoveryConfig,
    ) -> Result<Arc<dyn ServiceDiscovery>, ConfigError> {
        let discovery: Arc<dyn ServiceDiscovery> = match config {
            DiscoveryConfig::Static { servers } => {
                let discovery = StaticServiceDiscovery::new();
                for definition in call.parse_servers(servers)? {
                    discovery.add_server(definition);
                }
                Arc::new(discovery)
            }
            DiscoveryConfig::Caching { ttl_ms, delegate } => {
                Arc::new(CachingServiceDiscovery::new(
                    self.build_discovery(call, delegate)?,
                    Duration::from_millis(*ttl_ms),
                ))
            }
            DiscoveryConfig::Aggregating { delegates } => {
                let delegates = delegates
                    .iter()
                    .map(|d| self.build_discovery(call, d))
                    .collect::<Result<Vec<_>, _>>()?;
                Arc::new(AggregatingServiceDiscovery::new(delegates))
            }
            DiscoveryConfig::Custom { reference } => self
                .discoveries
                .get(reference)
                .cloned()
                .ok_or_else(|| unknown_ref(call, "discovery", reference))?,
        };
        Ok(discovery)
    }

    fn build_filter(
        &self,
        call: &ServiceCallConfig,
        config: &FilterConfig,
    ) -> Result<Arc<dyn ServiceFilter>, ConfigError> {
        let filter: Arc<dyn ServiceFilter> = match config {
            FilterConfig::Healthy => Arc::new(HealthyServiceFilter),
            FilterConfig::PassThrough => Arc::new(PassThroughServiceFilter),
            FilterConfig::Blacklist { servers } => {
                let mut filter = BlacklistServiceFilter::new();
                for definition in call.parse_servers(servers)? {
                    filter.add_server(definition);
                }
                Arc::new(filter)
            }
            FilterConfig::Chained { filters } => {
                let filters = filters
                    .iter()
                    .map(|f| self.build_filter(call, f))
                    .collect::<Result<Vec<_>, _>>()?;
                Arc::new(ChainedServiceFilter::new(filters))
            }
            FilterConfig::Custom { reference } => self
                .filters
                .get(reference)
                .cloned()
                .ok_or_else(|| unknown_ref(call, "filter", reference))?,
        };
        Ok(filter)
    }

    fn build_chooser(
        &self,
        call: &ServiceCallConfig,
    ) -> Result<Arc<dyn ServiceChooser>, ConfigError> {
        let chooser: Arc<dyn ServiceChooser> = match &call.chooser {
            ChooserConfig::RoundRobin => Arc::new(RoundRobinServiceChooser::new()),
            ChooserConfig::Random => Arc::new(RandomServiceChooser),
            ChooserConfig::Custom(name) => self
                .choosers
                .get(name)
                .cloned()
                .ok_or_else(|| unknown_ref(call, "chooser", name))?,
        };
        Ok(chooser)
    }
}

fn unknown_ref(call: &ServiceCallConfig, kind: &'static str, name: &str) -> ConfigError {
    ConfigError::UnknownRef {
        service: call.name.clone(),
        kind,
        name: name.to_string(),
    }
}

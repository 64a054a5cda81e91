//! Lodestar Runtime: discovery strategies, filters, choosers, load-balanced
//! dispatch and health checks.

pub mod balancer;
pub mod chooser;
pub mod config;
pub mod discovery;
pub mod factory;
pub mod filter;
pub mod health;
pub mod lifecycle;
pub mod worker;

pub use balancer::{
    CallOutcome, DefaultServiceLoadBalancer, LoadBalancerConfig, LoadBalancerError,
    ServiceLoadBalancer,
};
pub use config::{
    ChooserConfig, ConfigError, DiscoveryConfig, FilterConfig, HealthConfig, RuntimeConfig,
    ServiceCallConfig,
};
pub use factory::ServiceCallFactory;
pub use health::{HealthCheckRegistry, HealthCheckService};
pub use lifecycle::{ManagedService, ServiceContext, ServiceRegistry};

//! Lodestar Core: service definitions, discovery/filter/chooser contracts, and health check vocabulary.

pub mod definition;
pub mod health;
pub mod traits;

pub use definition::{DefinitionParseError, ServiceDefinition};
pub use health::{
    HealthCheck, HealthCheckConfiguration, HealthCheckKind, HealthCheckOptions,
    HealthCheckRepository, HealthCheckResult, HealthCheckResultBuilder, HealthState,
};
pub use traits::{ChooseError, DiscoveryError, ServiceChooser, ServiceDiscovery, ServiceFilter};

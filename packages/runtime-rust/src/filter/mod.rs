//! Built-in candidate filters.
//!
//! Every filter implements [`lodestar_core::ServiceFilter`]; plain closures
//! over `&[ServiceDefinition]` are filters too.

pub mod blacklist;
pub mod chained;
pub mod healthy;
pub mod pass_through;

pub use blacklist::BlacklistServiceFilter;
pub use chained::ChainedServiceFilter;
pub use healthy::HealthyServiceFilter;
pub use pass_through::PassThroughServiceFilter;

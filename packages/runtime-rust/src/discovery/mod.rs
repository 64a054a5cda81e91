//! Service discovery strategies.
//!
//! - **Static** (`static_list`): explicitly populated name -> endpoints mapping
//! - **Caching** (`caching`): TTL decorator with single-flight refresh per name
//! - **Aggregating** (`aggregating`): ordered union over several delegates
//!
//! All strategies implement [`lodestar_core::ServiceDiscovery`] and compose
//! as `Arc<dyn ServiceDiscovery>`.

pub mod aggregating;
pub mod caching;
pub mod static_list;

pub use aggregating::AggregatingServiceDiscovery;
pub use caching::CachingServiceDiscovery;
pub use static_list::StaticServiceDiscovery;

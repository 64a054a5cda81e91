//! Health checks: registry, aggregation, reporting and periodic polling.
//!
//! - [`HealthCheckRegistry`]: per-context registrations and settings
//! - [`helper`]: one-shot invoke over the registry
//!   (`invoke`, `invoke_readiness`, `invoke_liveness`)
//! - [`support`]: probe-driven checks, static repositories, discovery check
//! - [`report`]: JSON rendering at an exposure level
//! - [`HealthCheckService`]: background worker keeping the latest results

pub mod helper;
pub mod pattern;
pub mod registry;
pub mod report;
pub mod service;
pub mod support;

pub use helper::{invoke, invoke_liveness, invoke_readiness, is_results_up, HealthCheckError};
pub use pattern::ExcludePatterns;
pub use registry::{
    normalize_id, ComponentLookup, HealthCheckEntry, HealthCheckRegistry, HealthCheckResolver,
    ResolverTable,
};
pub use report::{render_report, ExposureLevel, ReportOptions};
pub use service::{HealthCheckService, HealthTask};
pub use support::{
    ProbeHealthCheck, ProbeHealthCheckBuilder, ServiceDiscoveryHealthCheck,
    StaticHealthCheckRepository,
};

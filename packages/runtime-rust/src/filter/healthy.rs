use lodestar_core::{ServiceDefinition, ServiceFilter};

/// Keeps only candidates whose definition reports itself healthy.
///
/// This is the default filter of a factory-built pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthyServiceFilter;

impl ServiceFilter for HealthyServiceFilter {
    fn apply(&self, candidates: &[ServiceDefinition]) -> Vec<ServiceDefinition> {
        candidates
            .iter()
            .filter(|d| d.is_healthy())
            .cloned()
            .collect()
    }
}

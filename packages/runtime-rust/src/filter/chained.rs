//! Filter composition.

use std::sync::Arc;

use lodestar_core::{ServiceDefinition, ServiceFilter};

/// Applies several filters in sequence, each to the previous one's output.
///
/// An empty chain behaves like a pass-through filter.
#[derive(Default)]
pub struct ChainedServiceFilter {
    filters: Vec<Arc<dyn ServiceFilter>>,
}

impl ChainedServiceFilter {
    #[must_use]
    pub fn new(filters: Vec<Arc<dyn ServiceFilter>>) -> Self {
        Self { filters }
    }

    /// Adds a filter after construction; it runs last.
    pub fn add(&mut self, filter: Arc<dyn ServiceFilter>) {
        self.filters.push(filter);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl ServiceFilter for ChainedServiceFilter {
    fn apply(&self, candidates: &[ServiceDefinition]) -> Vec<ServiceDefinition> {
        let mut current = candidates.to_vec();
        for filter in &self.filters {
            if current.is_empty() {
                break;
            }
            current = filter.apply(&current);
        }
        current
    }
}

//! Ordered union over several discovery delegates.

use std::sync::Arc;

use lodestar_core::{DiscoveryError, ServiceDefinition, ServiceDiscovery};

/// Concatenates the answers of its delegates in delegate order.
///
/// Duplicates are kept: each delegate is an independent catalog, and the
/// union is not a merge by identity. The first delegate error aborts the
/// lookup.
#[derive(Default)]
pub struct AggregatingServiceDiscovery {
    delegates: Vec<Arc<dyn ServiceDiscovery>>,
}

impl AggregatingServiceDiscovery {
    #[must_use]
    pub fn new(delegates: Vec<Arc<dyn ServiceDiscovery>>) -> Self {
        Self { delegates }
    }

    /// Appends another delegate after the existing ones.
    #[must_use]
    pub fn wrap(mut self, delegate: Arc<dyn ServiceDiscovery>) -> Self {
        self.delegates.push(delegate);
        self
    }

    /// Returns the delegates in query order.
    #[must_use]
    pub fn delegates(&self) -> &[Arc<dyn ServiceDiscovery>] {
        &self.delegates
    }
}

impl ServiceDiscovery for AggregatingServiceDiscovery {
    fn services(&self, service_name: &str) -> Result<Vec<ServiceDefinition>, DiscoveryError> {
        let mut services = Vec::new();
        for delegate in &self.delegates {
            services.extend(delegate.services(service_name)?);
        }
        Ok(services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::testing::ScriptedDiscovery;
    use crate::discovery::StaticServiceDiscovery;

    fn fixture() -> AggregatingServiceDiscovery {
        let d1 = StaticServiceDiscovery::from_specs("x@a:1,x@b:2").unwrap();
        let d2 = StaticServiceDiscovery::from_specs("x@c:3,y@d:4").unwrap();
        AggregatingServiceDiscovery::default()
            .wrap(Arc::new(d1))
            .wrap(Arc::new(d2))
    }

    #[test]
    fn concatenates_in_delegate_order() {
        let discovery = fixture();

        let hosts: Vec<String> = discovery
            .services("x")
            .unwrap()
            .iter()
            .map(|d| d.host().to_string())
            .collect();
        assert_eq!(hosts, vec!["a", "b", "c"]);

        let y = discovery.services("y").unwrap();
        assert_eq!(y, vec![ServiceDefinition::new("y", "d", 4)]);
        assert!(discovery.services("z").unwrap().is_empty());
    }

    #[test]
    fn keeps_duplicates_across_delegates() {
        let same = "x@a:1";
        let discovery = AggregatingServiceDiscovery::new(vec![
            Arc::new(StaticServiceDiscovery::from_specs(same).unwrap()),
            Arc::new(StaticServiceDiscovery::from_specs(same).unwrap()),
        ]);
        assert_eq!(discovery.services("x").unwrap().len(), 2);
    }

    #[test]
    fn exposes_delegates() {
        let discovery = fixture();
        assert_eq!(discovery.delegates().len(), 2);
    }

    #[test]
    fn delegate_failure_propagates() {
        let failing = ScriptedDiscovery::default();
        *failing.failing.lock() = true;
        let discovery = fixture().wrap(Arc::new(failing));

        let err = discovery.services("x").unwrap_err();
        assert_eq!(err.service(), "x");
    }
}

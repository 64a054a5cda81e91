//! Capability traits of the service call pipeline.
//!
//! The pipeline is `ServiceDiscovery` -> `ServiceFilter` -> `ServiceChooser`.
//! All three are synchronous and run on the caller's thread; any blocking
//! happens inside a discovery implementation that talks to a remote backend.

use crate::definition::ServiceDefinition;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by a [`ServiceDiscovery`].
///
/// An unknown service name is not an error: discovery returns an empty list
/// for it. This type is reserved for backend failures.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery backend failed for service '{service}': {source}")]
    Backend {
        service: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DiscoveryError {
    /// Wraps an opaque backend failure for the given service name.
    pub fn backend(service: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Backend {
            service: service.into(),
            source: source.into(),
        }
    }

    /// Returns the service name whose lookup failed.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::Backend { service, .. } => service,
        }
    }
}

/// Errors surfaced by a [`ServiceChooser`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChooseError {
    #[error("no candidates to choose from for service '{service}'")]
    NoCandidates { service: String },
}

// ---------------------------------------------------------------------------
// ServiceDiscovery
// ---------------------------------------------------------------------------

/// Produces the known endpoints of a logical service.
///
/// Implementations return definitions in a stable order of their choosing
/// and must return an empty list, never an error, for unknown names.
pub trait ServiceDiscovery: Send + Sync {
    /// Returns the endpoints currently known for `service_name`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Backend`] when a remote backend cannot be
    /// reached or answers with garbage.
    fn services(&self, service_name: &str) -> Result<Vec<ServiceDefinition>, DiscoveryError>;
}

// ---------------------------------------------------------------------------
// ServiceFilter
// ---------------------------------------------------------------------------

/// Narrows a discovered candidate list.
///
/// Filters are pure: the input slice is never mutated and calling `apply`
/// twice with the same input yields the same output.
pub trait ServiceFilter: Send + Sync {
    fn apply(&self, candidates: &[ServiceDefinition]) -> Vec<ServiceDefinition>;
}

impl<F> ServiceFilter for F
where
    F: Fn(&[ServiceDefinition]) -> Vec<ServiceDefinition> + Send + Sync,
{
    fn apply(&self, candidates: &[ServiceDefinition]) -> Vec<ServiceDefinition> {
        self(candidates)
    }
}

// ---------------------------------------------------------------------------
// ServiceChooser
// ---------------------------------------------------------------------------

/// Picks exactly one endpoint out of a filtered candidate list.
///
/// The returned reference always points into `candidates`. Stateful
/// choosers key their state by `service_name`.
pub trait ServiceChooser: Send + Sync {
    /// Chooses one of `candidates`.
    ///
    /// # Errors
    ///
    /// Returns [`ChooseError::NoCandidates`] when `candidates` is empty.
    fn choose<'a>(
        &self,
        service_name: &str,
        candidates: &'a [ServiceDefinition],
    ) -> Result<&'a ServiceDefinition, ChooseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_filters() {
        let only_even_ports = |candidates: &[ServiceDefinition]| {
            candidates
                .iter()
                .filter(|d| d.port() % 2 == 0)
                .cloned()
                .collect::<Vec<_>>()
        };
        let input = vec![
            ServiceDefinition::new("svc", "h", 1),
            ServiceDefinition::new("svc", "h", 2),
        ];
        let out = only_even_ports.apply(&input);
        assert_eq!(out, vec![ServiceDefinition::new("svc", "h", 2)]);
        assert_eq!(input.len(), 2);
    }

    #[test]
    fn backend_error_names_service() {
        let err = DiscoveryError::backend("orders", anyhow::anyhow!("connection refused"));
        assert_eq!(err.service(), "orders");
        assert_eq!(
            err.to_string(),
            "discovery backend failed for service 'orders': connection refused"
        );
    }
}

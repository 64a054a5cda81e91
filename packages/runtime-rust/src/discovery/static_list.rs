//! Fixed-topology discovery backed by an in-memory mapping.

use std::collections::HashMap;

use lodestar_core::{DefinitionParseError, DiscoveryError, ServiceDefinition, ServiceDiscovery};
use parking_lot::RwLock;
use tracing::debug;

/// Discovery over an explicitly populated name -> endpoints mapping.
///
/// Used for tests and fixed topologies. Mutation goes through `&self` so a
/// shared `Arc<StaticServiceDiscovery>` can be edited while the load
/// balancer holds it.
#[derive(Debug, Default)]
pub struct StaticServiceDiscovery {
    services: RwLock<HashMap<String, Vec<ServiceDefinition>>>,
}

impl StaticServiceDiscovery {
    /// Creates an empty discovery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a discovery pre-populated from a comma-separated spec list.
    ///
    /// # Errors
    ///
    /// Returns the parse error of the first malformed entry.
    pub fn from_specs(specs: &str) -> Result<Self, DefinitionParseError> {
        let discovery = Self::new();
        discovery.add_servers(specs)?;
        Ok(discovery)
    }

    /// Appends a definition under its own service name.
    pub fn add_server(&self, definition: ServiceDefinition) {
        debug!(server = %definition, "adding static server");
        self.services
            .write()
            .entry(definition.name().to_string())
            .or_default()
            .push(definition);
    }

    /// Parses and appends a single `name@host:port` spec.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionParseError`] naming the malformed spec.
    pub fn add_server_spec(&self, spec: &str) -> Result<(), DefinitionParseError> {
        self.add_server(ServiceDefinition::parse(spec)?);
        Ok(())
    }

    /// Parses and appends a comma-separated spec list.
    ///
    /// The whole list is parsed before anything is added, so a malformed
    /// entry leaves the discovery unchanged. Returns the number of servers added.
    ///
    /// # Errors
    ///
    /// Returns the parse error of the first malformed entry.
    pub fn add_servers(&self, specs: &str) -> Result<usize, DefinitionParseError> {
        let definitions = ServiceDefinition::parse_list(specs)?;
        let added = definitions.len();
        for definition in definitions {
            self.add_server(definition);
        }
        Ok(added)
    }

    /// Replaces every known server with the given specs.
    ///
    /// # Errors
    ///
    /// Returns the parse error of the first malformed spec; the previous
    /// servers are kept in that case.
    pub fn set_servers<I, S>(&self, specs: I) -> Result<(), DefinitionParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for spec in specs {
            parsed.extend(ServiceDefinition::parse_list(spec.as_ref())?);
        }

        let mut services = self.services.write();
        services.clear();
        for definition in parsed {
            services
                .entry(definition.name().to_string())
                .or_default()
                .push(definition);
        }
        Ok(())
    }

    /// Removes every entry equal to `definition`. Returns `true` if any was removed.
    pub fn remove_server(&self, definition: &ServiceDefinition) -> bool {
        self.remove_servers_if(|d| d == definition) > 0
    }

    /// Removes every server matching `predicate`. Returns the number removed.
    pub fn remove_servers_if<P>(&self, predicate: P) -> usize
    where
        P: Fn(&ServiceDefinition) -> bool,
    {
        let mut services = self.services.write();
        let mut removed = 0;
        for list in services.values_mut() {
            let before = list.len();
            list.retain(|d| !predicate(d));
            removed += before - list.len();
        }
        services.retain(|_, list| !list.is_empty());
        removed
    }

    /// Removes all servers.
    pub fn clear(&self) {
        self.services.write().clear();
    }

    /// Returns the service names that currently have servers.
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl ServiceDiscovery for StaticServiceDiscovery {
    fn services(&self, service_name: &str) -> Result<Vec<ServiceDefinition>, DiscoveryError> {
        Ok(self
            .services
            .read()
            .get(service_name)
            .cloned()
            .unwrap_or_default())
    }
}

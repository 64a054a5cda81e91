//! Filter that drops explicitly listed endpoints.

use std::collections::HashSet;

use lodestar_core::{DefinitionParseError, ServiceDefinition, ServiceFilter};

/// Removes candidates whose identity `(name, host, port)` is blacklisted.
///
/// Metadata and health flags play no part in matching.
#[derive(Debug, Clone, Default)]
pub struct BlacklistServiceFilter {
    blacklist: HashSet<ServiceDefinition>,
}

impl BlacklistServiceFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a filter from a comma-separated `name@host:port` list.
    ///
    /// # Errors
    ///
    /// Returns the parse error of the first malformed entry.
    pub fn from_specs(specs: &str) -> Result<Self, DefinitionParseError> {
        let mut filter = Self::new();
        filter.add_servers(specs)?;
        Ok(filter)
    }

    pub fn add_server(&mut self, definition: ServiceDefinition) {
        self.blacklist.insert(definition);
    }

    /// Parses and blacklists a single spec.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionParseError`] naming the malformed spec.
    pub fn add_server_spec(&mut self, spec: &str) -> Result<(), DefinitionParseError> {
        self.add_server(ServiceDefinition::parse(spec)?);
        Ok(())
    }

    /// Parses and blacklists a comma-separated list. Nothing is added if any entry is malformed.
    ///
    /// # Errors
    ///
    /// Returns the parse error of the first malformed entry.
    pub fn add_servers(&mut self, specs: &str) -> Result<(), DefinitionParseError> {
        let parsed = ServiceDefinition::parse_list(specs)?;
        self.blacklist.extend(parsed);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, definition: &ServiceDefinition) -> bool {
        self.blacklist.contains(definition)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blacklist.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blacklist.is_empty()
    }
}

impl ServiceFilter for BlacklistServiceFilter {
    fn apply(&self, candidates: &[ServiceDefinition]) -> Vec<ServiceDefinition> {
        candidates
            .iter()
            .filter(|d| !self.blacklist.contains(*d))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<ServiceDefinition> {
        [8080, 8081, 8082]
            .into_iter()
            .map(|port| ServiceDefinition::new("svc", "localhost", port))
            .collect()
    }

    #[test]
    fn drops_blacklisted_endpoint() {
        let filter = BlacklistServiceFilter::from_specs("svc@localhost:8080").unwrap();
        let input = candidates();

        let out = filter.apply(&input);
        let ports: Vec<u16> = out.iter().map(ServiceDefinition::port).collect();
        assert_eq!(ports, vec![8081, 8082]);
        assert_eq!(input.len(), 3);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let filter = BlacklistServiceFilter::from_specs("svc@localhost:8080").unwrap();
        let once = filter.apply(&candidates());
        let twice = filter.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn matches_full_identity_only() {
        let filter =
            BlacklistServiceFilter::from_specs("other@localhost:8080, svc@remote:8081").unwrap();
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.apply(&candidates()).len(), 3);
    }

    #[test]
    fn metadata_is_ignored_when_matching() {
        let mut filter = BlacklistServiceFilter::new();
        filter.add_server_spec("svc@localhost:8081").unwrap();

        let tagged = ServiceDefinition::new("svc", "localhost", 8081).with_metadata("zone", "a");
        assert!(filter.contains(&tagged));
        assert!(filter.apply(&[tagged]).is_empty());
    }

    #[test]
    fn malformed_bulk_list_adds_nothing() {
        let mut filter = BlacklistServiceFilter::new();
        assert!(filter.add_servers("svc@localhost:8080,svc@localhost").is_err());
        assert!(filter.is_empty());
    }
}

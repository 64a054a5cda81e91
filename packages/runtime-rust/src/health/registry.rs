//! Per-context registry of health checks and health check repositories.
//!
//! The registry owns registrations and settings only; it never schedules
//! checks. Aggregation lives in [`super::helper`] and periodic polling in
//! [`super::service`].

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use lodestar_core::{
    HealthCheck, HealthCheckKind, HealthCheckOptions, HealthCheckRepository, HealthState,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::pattern::ExcludePatterns;
use super::report::ExposureLevel;
use crate::config::HealthConfig;
use crate::lifecycle::{ManagedService, ServiceContext};

const CHECK_SUFFIX: &str = "-health-check";
const REPOSITORY_SUFFIX: &str = "-health-check-repository";
const ROUTE_PREFIX: &str = "route:";

/// Strips the conventional id decorations so `"db"`, `"db-health-check"`
/// and `"route:db"` all address the same check.
#[must_use]
pub fn normalize_id(id: &str) -> &str {
    let id = id.strip_prefix(ROUTE_PREFIX).unwrap_or(id);
    id.strip_suffix(REPOSITORY_SUFFIX)
        .or_else(|| id.strip_suffix(CHECK_SUFFIX))
        .unwrap_or(id)
}

// ---------------------------------------------------------------------------
// Entries and resolution capabilities
// ---------------------------------------------------------------------------

/// Something the registry can hold: a single check or a repository of checks.
#[derive(Clone)]
pub enum HealthCheckEntry {
    Check(Arc<dyn HealthCheck>),
    Repository(Arc<dyn HealthCheckRepository>),
}

impl HealthCheckEntry {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Check(check) => check.id(),
            Self::Repository(repository) => repository.id(),
        }
    }

    #[must_use]
    pub fn as_check(&self) -> Option<&Arc<dyn HealthCheck>> {
        match self {
            Self::Check(check) => Some(check),
            Self::Repository(_) => None,
        }
    }
}

impl fmt::Debug for HealthCheckEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check(check) => f.debug_tuple("Check").field(&check.id()).finish(),
            Self::Repository(repo) => f.debug_tuple("Repository").field(&repo.id()).finish(),
        }
    }
}

/// Lookup of components registered elsewhere in the owning context by name.
pub trait ComponentLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<HealthCheckEntry>;
}

/// Last-resort factory of checks and repositories by key.
pub trait HealthCheckResolver: Send + Sync {
    fn resolve(&self, key: &str) -> Option<HealthCheckEntry>;
}

type EntryFactory = Arc<dyn Fn() -> HealthCheckEntry + Send + Sync>;

/// [`HealthCheckResolver`] backed by a table of named factories.
#[derive(Default)]
pub struct ResolverTable {
    factories: DashMap<String, EntryFactory>,
}

impl ResolverTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `key`, replacing any previous one.
    pub fn insert<F>(&self, key: impl Into<String>, factory: F)
    where
        F: Fn() -> HealthCheckEntry + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
    }
}

impl HealthCheckResolver for ResolverTable {
    fn resolve(&self, key: &str) -> Option<HealthCheckEntry> {
        let factory = self.factories.get(key).map(|f| Arc::clone(f.value()))?;
        Some(factory())
    }
}

// ---------------------------------------------------------------------------
// HealthCheckRegistry
// ---------------------------------------------------------------------------

/// Registry of health checks owned by one runtime context.
///
/// Ids are unique per entry kind: registering a second check (or a second
/// repository) with an existing id is rejected.
pub struct HealthCheckRegistry {
    checks: RwLock<Vec<Arc<dyn HealthCheck>>>,
    repositories: RwLock<Vec<Arc<dyn HealthCheckRepository>>>,
    lookup: RwLock<Option<Arc<dyn ComponentLookup>>>,
    resolver: RwLock<Option<Arc<dyn HealthCheckResolver>>>,
    exclude: ArcSwap<ExcludePatterns>,
    exposure_level: ArcSwap<ExposureLevel>,
    initial_state: ArcSwap<HealthState>,
    enabled: AtomicBool,
    started: AtomicBool,
}

impl HealthCheckRegistry {
    /// Creates an enabled, not yet started registry with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: RwLock::new(Vec::new()),
            repositories: RwLock::new(Vec::new()),
            lookup: RwLock::new(None),
            resolver: RwLock::new(None),
            exclude: ArcSwap::from_pointee(ExcludePatterns::default()),
            exposure_level: ArcSwap::from_pointee(ExposureLevel::default()),
            initial_state: ArcSwap::from_pointee(HealthState::Down),
            enabled: AtomicBool::new(true),
            started: AtomicBool::new(false),
        }
    }

    /// Applies the `health` section of the runtime configuration.
    pub fn apply_config(&self, config: &HealthConfig) {
        self.set_enabled(config.enabled);
        self.set_exclude_pattern(config.exclude_pattern.as_deref());
        self.set_exposure_level(config.exposure_level);
        self.set_initial_state(config.initial_state);
    }

    // -- registration -------------------------------------------------------

    /// Adds a check or repository. Returns `false` if the id is already taken.
    ///
    /// Ids are unique per kind: a check and a repository may share an id,
    /// but two checks (or two repositories) may not.
    pub fn register(&self, entry: HealthCheckEntry) -> bool {
        let added = match &entry {
            HealthCheckEntry::Check(check) => {
                let mut checks = self.checks.write();
                if checks.iter().any(|c| c.id() == check.id()) {
                    false
                } else {
                    checks.push(Arc::clone(check));
                    true
                }
            }
            HealthCheckEntry::Repository(repository) => {
                let mut repositories = self.repositories.write();
                if repositories.iter().any(|r| r.id() == repository.id()) {
                    false
                } else {
                    repositories.push(Arc::clone(repository));
                    true
                }
            }
        };
        if added {
            debug!(entry = ?entry, "health check registered");
        } else {
            debug!(entry = ?entry, "health check id already registered");
        }
        added
    }

    /// Shorthand for registering a single check.
    pub fn register_check(&self, check: Arc<dyn HealthCheck>) -> bool {
        self.register(HealthCheckEntry::Check(check))
    }

    /// Shorthand for registering a repository.
    pub fn register_repository(&self, repository: Arc<dyn HealthCheckRepository>) -> bool {
        self.register(HealthCheckEntry::Repository(repository))
    }

    /// Removes the entry with the same kind and id. Returns `true` if one was removed.
    pub fn unregister(&self, entry: &HealthCheckEntry) -> bool {
        let removed = match entry {
            HealthCheckEntry::Check(check) => {
                let mut checks = self.checks.write();
                let before = checks.len();
                checks.retain(|c| c.id() != check.id());
                checks.len() != before
            }
            HealthCheckEntry::Repository(repository) => {
                let mut repositories = self.repositories.write();
                let before = repositories.len();
                repositories.retain(|r| r.id() != repository.id());
                repositories.len() != before
            }
        };
        if removed {
            debug!(entry = ?entry, "health check unregistered");
        }
        removed
    }

    // -- lookup -------------------------------------------------------------

    /// Finds a check by id among local checks, then among repository checks.
    ///
    /// Ids are compared after [`normalize_id`].
    #[must_use]
    pub fn get_check(&self, id: &str) -> Option<Arc<dyn HealthCheck>> {
        let wanted = normalize_id(id);
        let same = |check: &Arc<dyn HealthCheck>| normalize_id(check.id()) == wanted;

        if let Some(check) = self.checks.read().iter().find(|&c| same(c)) {
            return Some(Arc::clone(check));
        }
        self.repositories
            .read()
            .iter()
            .flat_map(|r| r.checks())
            .find(|c| same(c))
    }

    /// Returns every visible check: local checks, then the checks of enabled
    /// repositories, distinct by id with the first occurrence winning.
    ///
    /// Empty while the registry is disabled.
    #[must_use]
    pub fn stream(&self) -> Vec<Arc<dyn HealthCheck>> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let local = self.checks.read().clone();
        let repositories = self.repositories.read().clone();
        let from_repositories = repositories
            .iter()
            .filter(|r| r.is_enabled())
            .flat_map(|r| r.checks());

        for check in local.into_iter().chain(from_repositories) {
            if seen.insert(check.id().to_string()) {
                out.push(check);
            }
        }
        out
    }

    #[must_use]
    pub fn repositories(&self) -> Vec<Arc<dyn HealthCheckRepository>> {
        self.repositories.read().clone()
    }

    /// Installs the component lookup consulted by [`resolve_by_id`](Self::resolve_by_id).
    pub fn set_component_lookup(&self, lookup: Option<Arc<dyn ComponentLookup>>) {
        *self.lookup.write() = lookup;
    }

    /// Installs the resolver consulted by [`resolve_by_id`](Self::resolve_by_id).
    pub fn set_resolver(&self, resolver: Option<Arc<dyn HealthCheckResolver>>) {
        *self.resolver.write() = resolver;
    }

    /// Resolves a check or repository by id without registering it.
    ///
    /// Tried in order: local checks, local repositories, the component
    /// lookup (`id`, `id-health-check`, `id-health-check-repository`), then
    /// the resolver (`id-health-check`, `id-health-check-repository`, `id`).
    #[must_use]
    pub fn resolve_by_id(&self, id: &str) -> Option<HealthCheckEntry> {
        if let Some(check) = self.checks.read().iter().find(|c| c.id() == id) {
            return Some(HealthCheckEntry::Check(Arc::clone(check)));
        }
        if let Some(repository) = self.repositories.read().iter().find(|r| r.id() == id) {
            return Some(HealthCheckEntry::Repository(Arc::clone(repository)));
        }

        let check_key = format!("{id}{CHECK_SUFFIX}");
        let repository_key = format!("{id}{REPOSITORY_SUFFIX}");

        let lookup = self.lookup.read().clone();
        if let Some(lookup) = lookup {
            let found = [id, check_key.as_str(), repository_key.as_str()]
                .into_iter()
                .find_map(|key| lookup.lookup(key));
            if found.is_some() {
                return found;
            }
        }

        let resolver = self.resolver.read().clone();
        resolver.and_then(|resolver| {
            [check_key.as_str(), repository_key.as_str(), id]
                .into_iter()
                .find_map(|key| resolver.resolve(key))
        })
    }

    // -- settings -----------------------------------------------------------

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Sets the comma-separated exclude patterns; `None` clears them.
    pub fn set_exclude_pattern(&self, pattern: Option<&str>) {
        let patterns = pattern.map(ExcludePatterns::parse).unwrap_or_default();
        self.exclude.store(Arc::new(patterns));
    }

    #[must_use]
    pub fn exclude_pattern(&self) -> Option<String> {
        self.exclude.load().as_str().map(str::to_string)
    }

    /// Returns `true` if the check's id or group matches an exclude pattern.
    #[must_use]
    pub fn is_excluded(&self, check: &dyn HealthCheck) -> bool {
        let patterns = self.exclude.load();
        if patterns.is_empty() {
            return false;
        }
        patterns.matches(check.id()) || check.group().is_some_and(|g| patterns.matches(g))
    }

    #[must_use]
    pub fn exposure_level(&self) -> ExposureLevel {
        **self.exposure_level.load()
    }

    pub fn set_exposure_level(&self, level: ExposureLevel) {
        self.exposure_level.store(Arc::new(level));
    }

    #[must_use]
    pub fn initial_state(&self) -> HealthState {
        **self.initial_state.load()
    }

    pub fn set_initial_state(&self, state: HealthState) {
        self.initial_state.store(Arc::new(state));
    }

    /// Builds invocation options reflecting the registry's current settings.
    #[must_use]
    pub fn options(&self, kind: HealthCheckKind) -> HealthCheckOptions {
        HealthCheckOptions {
            kind,
            initial_state: self.initial_state(),
            context_started: self.is_started(),
            ..HealthCheckOptions::default()
        }
    }

    // -- lifecycle ----------------------------------------------------------

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Marks the owning context as started.
    pub fn start(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            info!("health check registry started");
        }
    }

    /// Drops every registration and marks the context as stopped.
    pub fn stop(&self) {
        self.started.store(false, Ordering::Release);
        let checks = std::mem::take(&mut *self.checks.write());
        let repositories = std::mem::take(&mut *self.repositories.write());
        info!(
            checks = checks.len(),
            repositories = repositories.len(),
            "health check registry stopped"
        );
    }
}

impl Default for HealthCheckRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManagedService for HealthCheckRegistry {
    fn name(&self) -> &str {
        "health-check-registry"
    }

    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        self.apply_config(&ctx.config.health);
        self.start();
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.apply_config(&HealthConfig::default());
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        self.stop();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::testing::{fixed, grouped};
    use crate::health::StaticHealthCheckRepository;

    #[test]
    fn two_distinct_checks_are_both_visible() {
        let registry = HealthCheckRegistry::new();
        assert!(registry.register_check(fixed("a", HealthState::Up)));
        assert!(registry.register_check(fixed("b", HealthState::Up)));
        assert_eq!(registry.stream().len(), 2);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let registry = HealthCheckRegistry::new();
        assert!(registry.register_check(fixed("a", HealthState::Up)));
        assert!(!registry.register_check(fixed("a", HealthState::Down)));

        let stream = registry.stream();
        assert_eq!(stream.len(), 1);
        let result = stream[0].call(&HealthCheckOptions::default()).unwrap();
        assert_eq!(result.state(), HealthState::Up);
    }

    #[test]
    fn ids_are_unique_per_kind() {
        let registry = HealthCheckRegistry::new();
        assert!(registry.register_check(fixed("a", HealthState::Up)));
        assert!(registry.register_repository(Arc::new(StaticHealthCheckRepository::new(
            "a",
            vec![]
        ))));
        assert!(!registry.register_repository(Arc::new(StaticHealthCheckRepository::new(
            "a",
            vec![]
        ))));
        assert_eq!(registry.repositories().len(), 1);
        assert_eq!(registry.stream().len(), 1);
    }

    #[test]
    fn unregister_by_kind_and_id() {
        let registry = HealthCheckRegistry::new();
        let check = fixed("a", HealthState::Up);
        registry.register_check(check.clone());

        let repo: Arc<dyn HealthCheckRepository> =
            Arc::new(StaticHealthCheckRepository::new("a", vec![]));
        assert!(!registry.unregister(&HealthCheckEntry::Repository(repo)));
        assert!(registry.unregister(&HealthCheckEntry::Check(check.clone())));
        assert!(!registry.unregister(&HealthCheckEntry::Check(check)));
        assert!(registry.stream().is_empty());
    }

    #[test]
    fn stream_merges_repositories_first_wins() {
        let registry = HealthCheckRegistry::new();
        registry.register_check(fixed("a", HealthState::Up));
        registry.register_repository(Arc::new(StaticHealthCheckRepository::new(
            "repo",
            vec![fixed("a", HealthState::Down), fixed("b", HealthState::Up)],
        )));
        registry.register_repository(Arc::new(
            StaticHealthCheckRepository::new("off", vec![fixed("c", HealthState::Up)])
                .with_enabled(false),
        ));

        let stream = registry.stream();
        let ids: Vec<&str> = stream.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let first = stream[0].call(&HealthCheckOptions::default()).unwrap();
        assert_eq!(first.state(), HealthState::Up);
        assert_eq!(registry.repositories().len(), 2);
    }

    #[test]
    fn disabled_registry_streams_nothing() {
        let registry = HealthCheckRegistry::new();
        registry.register_check(fixed("a", HealthState::Up));
        registry.set_enabled(false);
        assert!(registry.stream().is_empty());
        registry.set_enabled(true);
        assert_eq!(registry.stream().len(), 1);
    }

    #[test]
    fn get_check_normalizes_ids() {
        let registry = HealthCheckRegistry::new();
        registry.register_check(fixed("db-health-check", HealthState::Up));
        registry.register_repository(Arc::new(StaticHealthCheckRepository::new(
            "routes",
            vec![fixed("route:orders", HealthState::Up)],
        )));

        assert_eq!(registry.get_check("db").unwrap().id(), "db-health-check");
        assert_eq!(registry.get_check("db-health-check").unwrap().id(), "db-health-check");
        assert_eq!(registry.get_check("orders").unwrap().id(), "route:orders");
        assert!(registry.get_check("cache").is_none());
    }

    #[test]
    fn normalize_strips_decorations() {
        assert_eq!(normalize_id("db-health-check-repository"), "db");
        assert_eq!(normalize_id("db-health-check"), "db");
        assert_eq!(normalize_id("route:foo"), "foo");
        assert_eq!(normalize_id("plain"), "plain");
    }

    #[test]
    fn exclusion_matches_id_or_group() {
        let registry = HealthCheckRegistry::new();
        registry.set_exclude_pattern(Some("db-*,infra"));

        assert!(registry.is_excluded(fixed("db-primary", HealthState::Up).as_ref()));
        assert!(registry.is_excluded(grouped("cache", "infra").as_ref()));
        assert!(!registry.is_excluded(fixed("cache", HealthState::Up).as_ref()));
        assert_eq!(registry.exclude_pattern().as_deref(), Some("db-*,infra"));

        registry.set_exclude_pattern(None);
        assert!(!registry.is_excluded(fixed("db-primary", HealthState::Up).as_ref()));
    }

    struct MapLookup(Vec<(String, HealthCheckEntry)>);

    impl ComponentLookup for MapLookup {
        fn lookup(&self, name: &str) -> Option<HealthCheckEntry> {
            self.0.iter().find(|(k, _)| k == name).map(|(_, e)| e.clone())
        }
    }

    #[test]
    fn resolve_by_id_tiers() {
        let registry = HealthCheckRegistry::new();
        registry.register_check(fixed("local", HealthState::Up));
        registry.set_component_lookup(Some(Arc::new(MapLookup(vec![(
            "bean-health-check".to_string(),
            HealthCheckEntry::Check(fixed("bean", HealthState::Up)),
        )]))));
        let table = ResolverTable::new();
        table.insert("plugin-health-check-repository", || {
            HealthCheckEntry::Repository(Arc::new(StaticHealthCheckRepository::new(
                "plugin",
                vec![],
            )))
        });
        table.insert("bean-health-check", || {
            HealthCheckEntry::Check(fixed("shadowed", HealthState::Up))
        });
        registry.set_resolver(Some(Arc::new(table)));

        assert_eq!(registry.resolve_by_id("local").unwrap().id(), "local");
        assert_eq!(registry.resolve_by_id("bean").unwrap().id(), "bean");
        let plugin = registry.resolve_by_id("plugin").unwrap();
        assert!(matches!(plugin, HealthCheckEntry::Repository(_)));
        assert!(registry.resolve_by_id("missing").is_none());
        // Resolution never registers.
        assert_eq!(registry.stream().len(), 1);
    }

    #[test]
    fn options_reflect_settings() {
        let registry = HealthCheckRegistry::new();
        let options = registry.options(HealthCheckKind::Readiness);
        assert_eq!(options.kind, HealthCheckKind::Readiness);
        assert_eq!(options.initial_state, HealthState::Down);
        assert!(!options.context_started);

        registry.set_initial_state(HealthState::Unknown);
        registry.start();
        let options = registry.options(HealthCheckKind::All);
        assert_eq!(options.initial_state, HealthState::Unknown);
        assert!(options.context_started);
    }

    #[tokio::test]
    async fn lifecycle_applies_config_and_drains() {
        let registry = HealthCheckRegistry::new();
        registry.register_check(fixed("a", HealthState::Up));

        let mut config = crate::config::RuntimeConfig::default();
        config.health.exposure_level = ExposureLevel::Full;
        config.health.exclude_pattern = Some("x*".to_string());
        registry.init(&ServiceContext::new(config)).await.unwrap();

        assert!(registry.is_started());
        assert_eq!(registry.exposure_level(), ExposureLevel::Full);
        assert_eq!(registry.exclude_pattern().as_deref(), Some("x*"));

        registry.shutdown(false).await.unwrap();
        assert!(!registry.is_started());
        assert!(registry.stream().is_empty());
    }
}

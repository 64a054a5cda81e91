//! Lifecycle-managed services of a runtime context.
//!
//! The load balancers built by the factory, the health check registry and
//! the periodic health service all implement [`ManagedService`] and are
//! started and stopped through one [`ServiceRegistry`].

use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::RuntimeConfig;

// ---------------------------------------------------------------------------
// ServiceContext
// ---------------------------------------------------------------------------

/// Context handed to services during initialization.
#[derive(Debug, Clone, Default)]
pub struct ServiceContext {
    pub config: Arc<RuntimeConfig>,
}

impl ServiceContext {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

// ---------------------------------------------------------------------------
// ManagedService trait
// ---------------------------------------------------------------------------

/// A component with an explicit start/stop lifecycle.
///
/// The `Any` bound enables type-based lookup via [`ServiceRegistry::get`].
#[async_trait]
pub trait ManagedService: Send + Sync + Any {
    /// Unique name within a registry (e.g. `"health-registry"`, `"service-call:orders"`).
    fn name(&self) -> &str;

    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()>;

    /// Returns the service to its freshly constructed state.
    async fn reset(&self) -> anyhow::Result<()>;

    /// Shuts the service down. If `terminate` is true, skip graceful cleanup.
    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Registry for lifecycle-managed services.
///
/// - **By name** (`get_by_name`): uses the service's `name()`
/// - **By type** (`get::<T>`): uses `TypeId`; the most recent registration of a type wins
///
/// Services are initialized in registration order and shut down in reverse order.
pub struct ServiceRegistry {
    by_name: DashMap<String, Arc<dyn ManagedService>>,
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    init_order: RwLock<Vec<String>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            init_order: RwLock::new(Vec::new()),
        }
    }

    /// Registers a service and returns the shared handle to it.
    pub fn register<T: ManagedService>(&self, service: T) -> Arc<T> {
        let service = Arc::new(service);
        self.register_arc(Arc::clone(&service));
        service
    }

    /// Registers an already shared service.
    ///
    /// Re-registering a name replaces the previous service but keeps its
    /// original position in the init order.
    pub fn register_arc<T: ManagedService>(&self, service: Arc<T>) {
        let name = service.name().to_string();
        debug!(service = %name, "registering managed service");
        let previous = self.by_name.insert(name.clone(), service.clone());
        self.by_type.insert(TypeId::of::<T>(), service);
        if previous.is_none() {
            self.init_order.write().push(name);
        }
    }

    /// Retrieves a service by its concrete type.
    #[must_use]
    pub fn get<T: ManagedService>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ManagedService>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Returns the registered names in init order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.init_order.read().clone()
    }

    /// Initializes all registered services in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first `init()` failure; later services are not initialized.
    pub async fn init_all(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let order = self.names();
        for name in &order {
            if let Some(service) = self.get_by_name(name) {
                service.init(ctx).await?;
            }
        }
        info!(count = order.len(), "managed services initialized");
        Ok(())
    }

    /// Resets all registered services in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first `reset()` failure.
    pub async fn reset_all(&self) -> anyhow::Result<()> {
        for name in &self.names() {
            if let Some(service) = self.get_by_name(name) {
                service.reset().await?;
            }
        }
        Ok(())
    }

    /// Shuts down all registered services in reverse registration order.
    ///
    /// # Errors
    ///
    /// Returns the first `shutdown()` failure.
    pub async fn shutdown_all(&self, terminate: bool) -> anyhow::Result<()> {
        let order = self.names();
        for name in order.iter().rev() {
            if let Some(service) = self.get_by_name(name) {
                service.shutdown(terminate).await?;
            }
        }
        info!(count = order.len(), terminate, "managed services shut down");
        Ok(())
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Records lifecycle calls into a log shared across services.
    struct Recorder {
        name: String,
        resets: AtomicU32,
        log: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn new(name: &str, log: Arc<parking_lot::Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                resets: AtomicU32::new(0),
                log,
            }
        }
    }

    #[async_trait]
    impl ManagedService for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
            self.log.lock().push(format!("init:{}", self.name));
            Ok(())
        }

        async fn reset(&self) -> anyhow::Result<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
            self.log.lock().push(format!("shutdown:{}", self.name));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl ManagedService for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
            anyhow::bail!("cannot start")
        }
        async fn reset(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn log() -> Arc<parking_lot::Mutex<Vec<String>>> {
        Arc::new(parking_lot::Mutex::new(Vec::new()))
    }

    #[test]
    fn lookup_by_name_and_type() {
        let registry = ServiceRegistry::new();
        let handle = registry.register(Recorder::new("health", log()));

        assert_eq!(registry.get_by_name("health").unwrap().name(), "health");
        assert!(registry.get_by_name("nope").is_none());
        let typed = registry.get::<Recorder>().unwrap();
        assert!(Arc::ptr_eq(&typed, &handle));
        assert!(registry.get::<Failing>().is_none());
    }

    #[test]
    fn reregistering_keeps_init_position() {
        let registry = ServiceRegistry::new();
        let shared = log();
        registry.register(Recorder::new("a", shared.clone()));
        registry.register(Recorder::new("b", shared.clone()));
        registry.register(Recorder::new("a", shared));
        assert_eq!(registry.names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn init_in_order_shutdown_in_reverse() {
        let shared = log();
        let registry = ServiceRegistry::new();
        registry.register(Recorder::new("first", shared.clone()));
        registry.register(Recorder::new("second", shared.clone()));
        registry.register(Recorder::new("third", shared.clone()));

        registry.init_all(&ServiceContext::default()).await.unwrap();
        registry.shutdown_all(false).await.unwrap();

        assert_eq!(
            shared.lock().clone(),
            vec![
                "init:first",
                "init:second",
                "init:third",
                "shutdown:third",
                "shutdown:second",
                "shutdown:first",
            ]
        );
    }

    #[tokio::test]
    async fn init_failure_stops_the_sequence() {
        let shared = log();
        let registry = ServiceRegistry::new();
        registry.register(Failing);
        registry.register(Recorder::new("after", shared.clone()));

        assert!(registry.init_all(&ServiceContext::default()).await.is_err());
        assert!(shared.lock().is_empty());
    }

    #[tokio::test]
    async fn reset_all_reaches_every_service() {
        let registry = ServiceRegistry::new();
        let a = registry.register(Recorder::new("a", log()));
        let b = registry.register(Recorder::new("b", log()));

        registry.reset_all().await.unwrap();
        assert_eq!(a.resets.load(Ordering::SeqCst), 1);
        assert_eq!(b.resets.load(Ordering::SeqCst), 1);
    }
}

//! TTL caching decorator over another discovery.
//!
//! Each service name owns a small cache record guarded by its own mutex. The
//! records live in a `DashMap`, so a refresh for one name never blocks
//! lookups of another, while concurrent callers of the same expired name
//! serialize on that name's mutex and only the first one hits the delegate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lodestar_core::{DiscoveryError, ServiceDefinition, ServiceDiscovery};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Per-name cache record.
#[derive(Debug, Default)]
struct CacheEntry {
    services: Vec<ServiceDefinition>,
    /// `None` until the first successful refresh.
    refreshed_at: Option<Instant>,
}

/// Discovery decorator that caches the delegate's answer per service name.
///
/// An entry is served while `now - refreshed_at < ttl`; the first call after
/// expiry refreshes it synchronously. A failed refresh propagates the
/// delegate's error and leaves the stale entry unserved, so the next call
/// tries the delegate again.
pub struct CachingServiceDiscovery {
    delegate: Arc<dyn ServiceDiscovery>,
    ttl: Duration,
    entries: DashMap<String, Arc<Mutex<CacheEntry>>>,
}

impl CachingServiceDiscovery {
    /// Wraps `delegate` with the given time-to-live. The TTL cannot change afterwards.
    #[must_use]
    pub fn new(delegate: Arc<dyn ServiceDiscovery>, ttl: Duration) -> Self {
        Self {
            delegate,
            ttl,
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn delegate(&self) -> &Arc<dyn ServiceDiscovery> {
        &self.delegate
    }

    /// Drops the cached entry for one name; the next lookup refreshes it.
    pub fn invalidate(&self, service_name: &str) {
        self.entries.remove(service_name);
    }

    /// Drops every cached entry.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Returns the record for `service_name`, creating an empty one if needed.
    ///
    /// The map guard is released before the caller locks the record.
    fn entry(&self, service_name: &str) -> Arc<Mutex<CacheEntry>> {
        if let Some(entry) = self.entries.get(service_name) {
            return Arc::clone(entry.value());
        }
        Arc::clone(
            self.entries
                .entry(service_name.to_string())
                .or_default()
                .value(),
        )
    }
}

impl ServiceDiscovery for CachingServiceDiscovery {
    fn services(&self, service_name: &str) -> Result<Vec<ServiceDefinition>, DiscoveryError> {
        let record = self.entry(service_name);
        let mut entry = record.lock();

        if let Some(refreshed_at) = entry.refreshed_at {
            if refreshed_at.elapsed() < self.ttl {
                return Ok(entry.services.clone());
            }
        }

        let services = match self.delegate.services(service_name) {
            Ok(services) => services,
            Err(err) => {
                warn!(service = service_name, error = %err, "discovery refresh failed");
                if entry.refreshed_at.is_none() {
                    // Never populated: forget the name.
                    self.entries
                        .remove_if(service_name, |_, stored| Arc::ptr_eq(stored, &record));
                }
                return Err(err);
            }
        };

        debug!(
            service = service_name,
            count = services.len(),
            "refreshed cached discovery entry"
        );
        entry.services.clone_from(&services);
        entry.refreshed_at = Some(Instant::now());
        Ok(services)
    }
}

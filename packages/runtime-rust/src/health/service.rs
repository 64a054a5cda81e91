//! Periodic health polling on top of the invoke-once registry.
//!
//! [`HealthCheckService`] runs every registered check on a fixed interval
//! and on demand, and keeps the latest result per check id. Checks are
//! synchronous, so each batch runs on tokio's blocking pool.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use lodestar_core::{HealthCheckKind, HealthCheckResult};
use tracing::{debug, info, warn};

use super::helper::invoke;
use super::registry::{normalize_id, HealthCheckRegistry};
use crate::lifecycle::{ManagedService, ServiceContext};
use crate::worker::{BackgroundRunnable, BackgroundWorker};

/// Work items accepted by the health service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthTask {
    /// Invoke every check and replace the stored results.
    RunAll,
    /// Invoke one check by id (normalized lookup) and store its result.
    Run { id: String },
}

type ResultStore = Arc<DashMap<String, HealthCheckResult>>;

// ---------------------------------------------------------------------------
// HealthPoller
// ---------------------------------------------------------------------------

struct HealthPoller {
    registry: Arc<HealthCheckRegistry>,
    results: ResultStore,
}

impl HealthPoller {
    async fn run_all(&self) {
        let registry = Arc::clone(&self.registry);
        let batch = tokio::task::spawn_blocking(move || {
            invoke(&registry, |_| registry.options(HealthCheckKind::All), |_| true)
        })
        .await;

        match batch {
            Ok(Ok(results)) => {
                let fresh: HashSet<String> =
                    results.iter().map(|r| r.check_id().to_string()).collect();
                self.results.retain(|id, _| fresh.contains(id));
                for result in results {
                    self.results.insert(result.check_id().to_string(), result);
                }
                debug!(checks = fresh.len(), "health checks polled");
            }
            Ok(Err(err)) => warn!(error = %err, "health poll aborted"),
            Err(err) => warn!(error = %err, "health poll task failed"),
        }
    }

    async fn run_one(&self, id: &str) {
        let Some(check) = self.registry.get_check(id) else {
            warn!(check = id, "requested health check is not registered");
            return;
        };
        let options = self.registry.options(HealthCheckKind::All);
        let outcome = tokio::task::spawn_blocking(move || check.call(&options)).await;

        match outcome {
            Ok(Ok(result)) => {
                self.results.insert(result.check_id().to_string(), result);
            }
            Ok(Err(err)) => warn!(check = id, error = %err, "health check could not be invoked"),
            Err(err) => warn!(check = id, error = %err, "health check task failed"),
        }
    }
}

#[async_trait]
impl BackgroundRunnable for HealthPoller {
    type Task = HealthTask;

    async fn run(&mut self, task: HealthTask) {
        match task {
            HealthTask::RunAll => self.run_all().await,
            HealthTask::Run { id } => self.run_one(&id).await,
        }
    }

    async fn on_tick(&mut self) {
        self.run_all().await;
    }
}

// ---------------------------------------------------------------------------
// HealthCheckService
// ---------------------------------------------------------------------------

/// Background service that polls a [`HealthCheckRegistry`].
pub struct HealthCheckService {
    registry: Arc<HealthCheckRegistry>,
    results: ResultStore,
    interval: Duration,
    worker: tokio::sync::Mutex<Option<BackgroundWorker<HealthPoller>>>,
}

impl HealthCheckService {
    #[must_use]
    pub fn new(registry: Arc<HealthCheckRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            results: Arc::new(DashMap::new()),
            interval,
            worker: tokio::sync::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<HealthCheckRegistry> {
        &self.registry
    }

    /// Starts polling. Calling it on a running service is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll interval is zero.
    pub async fn start(&self) -> anyhow::Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_none() {
            let poller = HealthPoller {
                registry: Arc::clone(&self.registry),
                results: Arc::clone(&self.results),
            };
            *worker = Some(BackgroundWorker::start(poller, self.interval)?);
            info!(interval = ?self.interval, "health check service started");
        }
        Ok(())
    }

    /// Stops polling and waits for an in-flight batch to finish.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        if let Some(mut running) = worker.take() {
            running.stop().await;
            info!("health check service stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(BackgroundWorker::is_running)
    }

    /// Queues a task for the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is not running.
    pub async fn submit(&self, task: HealthTask) -> anyhow::Result<()> {
        let worker = self.worker.lock().await;
        match worker.as_ref() {
            Some(running) => running.submit(task).await,
            None => Err(anyhow::anyhow!("health check service not running")),
        }
    }

    /// Returns the latest stored results ordered by check id.
    #[must_use]
    pub fn results(&self) -> Vec<HealthCheckResult> {
        let mut results: Vec<HealthCheckResult> =
            self.results.iter().map(|e| e.value().clone()).collect();
        results.sort_by(|a, b| a.check_id().cmp(b.check_id()));
        results
    }

    /// Returns the latest result of one check. The id is matched after
    /// normalization, as in [`HealthCheckRegistry::get_check`].
    #[must_use]
    pub fn result(&self, id: &str) -> Option<HealthCheckResult> {
        if let Some(entry) = self.results.get(id) {
            return Some(entry.value().clone());
        }
        let wanted = normalize_id(id);
        self.results
            .iter()
            .find(|e| normalize_id(e.key()) == wanted)
            .map(|e| e.value().clone())
    }
}

#[async_trait]
impl ManagedService for HealthCheckService {
    fn name(&self) -> &str {
        "health-check-service"
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        self.start().await
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.results.clear();
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        self.stop().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use lodestar_core::HealthState;

    use super::*;
    use crate::health::testing::{fixed, Scripted};

    async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    fn registry_with_checks() -> Arc<HealthCheckRegistry> {
        let registry = Arc::new(HealthCheckRegistry::new());
        registry.register_check(fixed("a", HealthState::Up));
        registry.register_check(fixed("b", HealthState::Down));
        registry
    }

    #[tokio::test]
    async fn run_all_stores_latest_results() {
        let service = HealthCheckService::new(registry_with_checks(), Duration::from_secs(60));
        service.start().await.unwrap();
        service.submit(HealthTask::RunAll).await.unwrap();

        assert!(eventually(|| service.results().len() == 2).await);
        assert_eq!(service.result("b").unwrap().state(), HealthState::Down);
        assert!(service.result("c").is_none());
        service.stop().await;
    }

    #[tokio::test]
    async fn interval_polls_without_requests() {
        let service = HealthCheckService::new(registry_with_checks(), Duration::from_millis(20));
        service.start().await.unwrap();

        assert!(eventually(|| service.results().len() == 2).await);
        service.stop().await;
        assert!(!service.is_running().await);
    }

    #[tokio::test]
    async fn run_single_check_by_id() {
        let registry = Arc::new(HealthCheckRegistry::new());
        registry.register_check(fixed("db-health-check", HealthState::Up));
        registry.register_check(fixed("cache", HealthState::Up));
        let service = HealthCheckService::new(registry, Duration::from_secs(60));
        service.start().await.unwrap();

        service
            .submit(HealthTask::Run { id: "db".to_string() })
            .await
            .unwrap();
        assert!(eventually(|| service.result("db-health-check").is_some()).await);
        assert!(service.result("cache").is_none());
        service.stop().await;
    }

    #[tokio::test]
    async fn unregistered_checks_drop_out_on_next_poll() {
        let registry = registry_with_checks();
        let service = HealthCheckService::new(Arc::clone(&registry), Duration::from_secs(60));
        service.start().await.unwrap();
        service.submit(HealthTask::RunAll).await.unwrap();
        assert!(eventually(|| service.results().len() == 2).await);

        registry.unregister(&crate::health::HealthCheckEntry::Check(fixed("b", HealthState::Up)));
        service.submit(HealthTask::RunAll).await.unwrap();
        assert!(eventually(|| service.results().len() == 1).await);
        service.stop().await;
    }

    #[tokio::test]
    async fn failed_batch_keeps_previous_results() {
        let registry = registry_with_checks();
        let service = HealthCheckService::new(Arc::clone(&registry), Duration::from_secs(60));
        service.start().await.unwrap();
        service.submit(HealthTask::RunAll).await.unwrap();
        assert!(eventually(|| service.results().len() == 2).await);

        registry.register_check(Scripted::new("broken").erroring().into_arc());
        service.submit(HealthTask::RunAll).await.unwrap();
        // Queue a marker so the failed batch is known to have finished.
        service
            .submit(HealthTask::Run { id: "a".to_string() })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.results().len(), 2);
        service.stop().await;
    }

    #[tokio::test]
    async fn submit_requires_running_service() {
        let service = HealthCheckService::new(registry_with_checks(), Duration::from_secs(60));
        assert!(service.submit(HealthTask::RunAll).await.is_err());

        service.init(&ServiceContext::default()).await.unwrap();
        assert!(service.is_running().await);
        service.shutdown(false).await.unwrap();
        assert!(service.submit(HealthTask::RunAll).await.is_err());
    }

    #[tokio::test]
    async fn result_lookup_normalizes_ids() {
        let registry = Arc::new(HealthCheckRegistry::new());
        registry.register_check(fixed("db", HealthState::Up));
        registry.register_check(fixed("cache-health-check", HealthState::Down));
        let service = HealthCheckService::new(registry, Duration::from_secs(60));
        service.start().await.unwrap();
        service.submit(HealthTask::RunAll).await.unwrap();
        assert!(eventually(|| service.results().len() == 2).await);

        assert_eq!(service.result("db-health-check").unwrap().check_id(), "db");
        assert_eq!(service.result("route:db").unwrap().check_id(), "db");
        assert_eq!(service.result("cache").unwrap().state(), HealthState::Down);
        assert!(service.result("queue-health-check").is_none());
        service.stop().await;
    }

    #[tokio::test]
    async fn zero_interval_fails_to_start() {
        let service = HealthCheckService::new(registry_with_checks(), Duration::ZERO);
        assert!(service.start().await.is_err());
        assert!(!service.is_running().await);
        assert!(service.init(&ServiceContext::default()).await.is_err());
        assert!(service.submit(HealthTask::RunAll).await.is_err());
    }
}

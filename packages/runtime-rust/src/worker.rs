//! Background worker for periodic and on-demand tasks.
//!
//! A [`BackgroundWorker`] owns one tokio task that feeds queued tasks and
//! interval ticks into a [`BackgroundRunnable`] until it is stopped.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Capacity of the task queue between submitters and the worker task.
const TASK_QUEUE_CAPACITY: usize = 64;

/// Task handler driven by a [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Processes one submitted task.
    async fn run(&mut self, task: Self::Task);

    /// Called on every tick of the worker's interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once after the loop exits. Default is a no-op.
    async fn shutdown(&mut self) {}
}

/// Handle to a running worker task.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawns the worker task. The first tick fires one `tick` after start.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `tick` is zero.
    pub fn start(mut runnable: R, tick: Duration) -> anyhow::Result<Self> {
        if tick.is_zero() {
            anyhow::bail!("worker tick interval must be non-zero");
        }
        let (tx, mut rx) = mpsc::channel::<R::Task>(TASK_QUEUE_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    task = rx.recv() => match task {
                        Some(task) => runnable.run(task).await,
                        None => break,
                    },
                    _ = ticker.tick() => runnable.on_tick().await,
                    _ = &mut shutdown_rx => break,
                }
            }

            runnable.shutdown().await;
        });

        Ok(Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Queues a task, waiting for queue capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        let Some(tx) = &self.tx else {
            anyhow::bail!("worker not running");
        };
        tx.send(task)
            .await
            .map_err(|_| anyhow::anyhow!("worker channel closed"))
    }

    /// Queues a task without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped or the queue is full.
    pub fn try_submit(&self, task: R::Task) -> anyhow::Result<()> {
        let Some(tx) = &self.tx else {
            anyhow::bail!("worker not running");
        };
        tx.try_send(task)
            .map_err(|err| anyhow::anyhow!("cannot queue task: {err}"))
    }

    /// Stops the worker and waits for its task, including `shutdown`, to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default, Clone)]
    struct Counts {
        runs: Arc<AtomicU32>,
        ticks: Arc<AtomicU32>,
        shutdowns: Arc<AtomicU32>,
    }

    struct Counting(Counts);

    #[async_trait]
    impl BackgroundRunnable for Counting {
        type Task = u32;

        async fn run(&mut self, task: u32) {
            self.0.runs.fetch_add(task, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.0.ticks.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.0.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn processes_submitted_tasks_then_shuts_down() {
        let counts = Counts::default();
        let mut worker =
            BackgroundWorker::start(Counting(counts.clone()), Duration::from_secs(60)).unwrap();
        assert!(worker.is_running());

        worker.submit(1).await.unwrap();
        worker.try_submit(2).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counts.runs.load(Ordering::SeqCst), 3);
        assert_eq!(counts.ticks.load(Ordering::SeqCst), 0);

        worker.stop().await;
        assert!(!worker.is_running());
        assert_eq!(counts.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ticks_fire_on_interval() {
        let counts = Counts::default();
        let mut worker =
            BackgroundWorker::start(Counting(counts.clone()), Duration::from_millis(20)).unwrap();

        tokio::time::sleep(Duration::from_millis(110)).await;
        worker.stop().await;

        assert!(counts.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn submit_after_stop_fails() {
        let mut worker =
            BackgroundWorker::start(Counting(Counts::default()), Duration::from_secs(60)).unwrap();
        worker.stop().await;

        assert!(worker.submit(1).await.is_err());
        assert!(worker.try_submit(1).is_err());
    }

    #[tokio::test]
    async fn zero_tick_is_rejected() {
        let counts = Counts::default();
        let err = BackgroundWorker::start(Counting(counts.clone()), Duration::ZERO)
            .err()
            .unwrap();
        assert!(err.to_string().contains("non-zero"));
        assert_eq!(counts.shutdowns.load(Ordering::SeqCst), 0);
    }
}

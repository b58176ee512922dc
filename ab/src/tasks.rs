//! Owned background task handles
//!
//! Every long-running loop in the bus (recovery scanner, health checks,
//! failure detection) runs under a PeriodicTask: one cancellable tokio
//! task with idempotent start and awaited stop. Starting twice never
//! duplicates the loop; stop returns only after the task has exited.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

struct RunningTask {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

/// Handle owning one recurring background loop
pub struct PeriodicTask {
    name: &'static str,
    inner: Mutex<Option<RunningTask>>,
}

impl PeriodicTask {
    /// Create a stopped task handle
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(None),
        }
    }

    /// Spawn the loop if it is not already running
    ///
    /// The first tick fires immediately, then every `interval`. Returns
    /// false (and changes nothing) if the loop is already running.
    pub async fn start<F, Fut>(&self, interval: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut guard = self.inner.lock().await;
        if let Some(running) = guard.as_ref()
            && !running.handle.is_finished()
        {
            debug!(task = self.name, "start: already running");
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let name = self.name;
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(task = name, ?interval, "periodic task started");
            loop {
                tokio::select! {
                    _ = timer.tick() => tick().await,
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!(task = name, "periodic task stopped");
        });

        *guard = Some(RunningTask { handle, shutdown_tx });
        true
    }

    /// Cancel the loop and wait for it to exit
    ///
    /// Returns false if no loop was running. Safe to call repeatedly.
    pub async fn stop(&self) -> bool {
        let running = self.inner.lock().await.take();
        let Some(running) = running else {
            return false;
        };

        let _ = running.shutdown_tx.send(()).await;
        let _ = running.handle.await;
        true
    }

    /// Whether the loop is currently alive
    pub async fn is_running(&self) -> bool {
        self.inner
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

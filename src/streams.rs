use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Tracked pool for detached streaming replies.
///
/// At most `max_concurrent` tasks run at once; the rest wait for a permit.
/// [`StreamTasks::drain`] waits for everything spawned so far.
#[derive(Clone)]
pub struct StreamTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
    permits: Arc<Semaphore>,
}

impl StreamTasks {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Spawn `task` once a permit is available. Returns immediately.
    pub async fn spawn<F>(&self, name: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let name = name.to_string();
        let mut tasks = self.tasks.lock().await;

        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                warn!("Stream task ended abnormally: {}", e);
            }
        }

        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!("Stream pool closed, dropping task '{}'", name);
                return;
            };
            debug!("Stream task '{}' started", name);
            task.await;
            debug!("Stream task '{}' finished", name);
        });
    }

    pub async fn in_flight(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Wait for in-flight tasks, aborting whatever is left after `timeout`.
    pub async fn drain(&self, timeout: Duration) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        if tasks.is_empty() {
            return;
        }
        info!("Draining {} stream task(s)", tasks.len());

        let wait_all = async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!("Stream task ended abnormally: {}", e);
                }
            }
        };

        if tokio::time::timeout(timeout, wait_all).await.is_err() {
            warn!(
                "Stream drain timed out after {:?}, aborting {} task(s)",
                timeout,
                tasks.len()
            );
            tasks.shutdown().await;
        }
    }
}

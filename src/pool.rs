use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs spawned jobs with at most `size` of them in flight.
pub struct WorkerPool<T> {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.max(1))),
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, job: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        self.tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("worker pool semaphore is closed");
            job.await
        });
    }

    /// Waits for every job; results come back in completion order.
    pub async fn join_all(mut self) -> anyhow::Result<Vec<T>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.tasks.join_next().await {
            results.push(result.context("join worker task")?);
        }
        Ok(results)
    }
}

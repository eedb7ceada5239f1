//! Bounded worker pool with synchronous-per-caller submission

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

type Work<J, R> = dyn Fn(J) -> BoxFuture<'static, R> + Send + Sync;

/// A fixed number of workers all running the same job function.
///
/// [`WorkerPool::process`] waits for a free worker, runs the job on it and
/// returns the result to the caller. Callers that want parallelism submit
/// from separate tasks, see [`super::fan_in`].
pub struct WorkerPool<J, R> {
    name: &'static str,
    size: usize,
    slots: Arc<Semaphore>,
    work: Arc<Work<J, R>>,
}

impl<J, R> Clone for WorkerPool<J, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            size: self.size,
            slots: Arc::clone(&self.slots),
            work: Arc::clone(&self.work),
        }
    }
}

impl<J, R> WorkerPool<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    /// `size` is clamped to at least one worker.
    pub fn new<F, Fut>(name: &'static str, size: usize, work: F) -> Self
    where
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let size = size.max(1);
        let work: Arc<Work<J, R>> = Arc::new(move |job| -> BoxFuture<'static, R> { Box::pin(work(job)) });
        Self {
            name,
            size,
            slots: Arc::new(Semaphore::new(size)),
            work,
        }
    }

    pub async fn process(&self, job: J) -> R {
        // The semaphore is never closed, so acquisition only fails after a panic elsewhere.
        let _slot = self.slots.acquire().await.ok();
        trace!(pool = self.name(), busy = self.busy(), size = self.size(), "worker started");
        (self.work)(job).await
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently running on a worker
    pub fn busy(&self) -> usize {
        self.size - self.slots.available_permits()
    }
}

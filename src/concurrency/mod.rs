//! Concurrency primitives for the promotion stages
//!
//! Every stage follows the same shape: one submitter task per item, each
//! blocking on a [`WorkerPool`], all reporting into one channel. The stage
//! is done when it has drained exactly as many results as it submitted.

pub mod pool;

pub use pool::WorkerPool;

use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

/// Run `submit` for every job on its own task and gather the results.
///
/// Results arrive in completion order. `on_complete` sees each one as it
/// lands, which is where stages advance their progress display. Returns only
/// once all `jobs.len()` results are in: a submitter that panics or is
/// cancelled is replaced by `on_lost(job, reason)`.
pub async fn fan_in<J, R, F, Fut>(
    jobs: Vec<J>,
    submit: F,
    on_lost: impl Fn(J, String) -> R,
    mut on_complete: impl FnMut(&R),
) -> Vec<R>
where
    J: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(J) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let expected = jobs.len();
    if expected == 0 {
        return Vec::new();
    }

    // Capacity for every result, so no submitter ever waits on the collector.
    let (tx, mut rx) = mpsc::channel(expected);
    let mut pending: Vec<Option<(J, JoinHandle<()>)>> = Vec::with_capacity(expected);
    for (index, job) in jobs.into_iter().enumerate() {
        let tx = tx.clone();
        let task = submit(job.clone());
        let handle = tokio::spawn(async move {
            let result = task.await;
            let _ = tx.send((index, result)).await;
        });
        pending.push(Some((job, handle)));
    }
    drop(tx);

    let mut results = Vec::with_capacity(expected);
    while let Some((index, result)) = rx.recv().await {
        pending[index] = None;
        on_complete(&result);
        results.push(result);
    }

    // Every sender is gone, so whatever is still pending ended without a result.
    for (job, handle) in pending.into_iter().flatten() {
        let reason = match handle.await {
            Err(e) if e.is_panic() => "worker panicked".to_string(),
            Err(e) => e.to_string(),
            Ok(()) => "worker ended without a result".to_string(),
        };
        error!(expected, received = results.len(), %reason, "submitter task lost its result");
        let result = on_lost(job, reason);
        on_complete(&result);
        results.push(result);
    }
    results
}

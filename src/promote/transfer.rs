//! Blob transfer from source to destination

use crate::concurrency::{WorkerPool, fan_in};
use crate::error::RegistryError;
use crate::image::FsLayer;
use crate::progress::{ByteCounter, CountingStream, StageProgress};
use crate::promote::Endpoint;
use crate::promote::check::LayerCheck;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub layer: FsLayer,
    pub download_error: Option<RegistryError>,
    pub upload_error: Option<RegistryError>,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.download_error.is_none() && self.upload_error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferSummary {
    pub outcomes: Vec<TransferOutcome>,
    /// Progress units added: every transferred byte counts once down and once up
    pub progress_bytes: u64,
}

/// The layers [`transfer_layers`] will submit
pub fn pending_transfers(checks: &[LayerCheck]) -> Vec<FsLayer> {
    checks
        .iter()
        .filter(|check| check.needs_transfer())
        .map(|check| check.layer.clone())
        .collect()
}

/// Stream every missing layer from source to destination.
///
/// Layers already present, or whose metadata lookup failed, are not
/// submitted. The byte drain lives exactly as long as this call.
pub async fn transfer_layers(
    source: &Endpoint,
    destination: &Endpoint,
    checks: &[LayerCheck],
    concurrency: usize,
    progress: Arc<dyn StageProgress>,
) -> TransferSummary {
    for check in checks {
        if let Some(error) = &check.error {
            warn!(digest = %check.layer.blob_sum, %error, "failed to retrieve layer data");
        }
    }

    let (counter, drain) = ByteCounter::spawn(Arc::clone(&progress));
    let source = source.clone();
    let destination = destination.clone();

    let pool = {
        let counter = counter.clone();
        WorkerPool::new("transfer", concurrency, move |layer: FsLayer| {
            let source = source.clone();
            let destination = destination.clone();
            let counter = counter.clone();
            async move { transfer_one(&source, &destination, layer, counter).await }
        })
    };

    let outcomes = fan_in(
        pending_transfers(checks),
        |layer| {
            let pool = pool.clone();
            async move { pool.process(layer).await }
        },
        |layer, reason| TransferOutcome {
            layer,
            download_error: Some(RegistryError::Worker(reason)),
            upload_error: None,
        },
        |_| {},
    )
    .await;

    // The drain finishes once every counter clone is gone.
    drop(pool);
    drop(counter);
    let progress_bytes = match drain.await {
        Ok(total) => total,
        Err(error) => {
            warn!(%error, "byte progress drain failed");
            0
        }
    };
    progress.finish();

    TransferSummary {
        outcomes,
        progress_bytes,
    }
}

async fn transfer_one(
    source: &Endpoint,
    destination: &Endpoint,
    layer: FsLayer,
    counter: ByteCounter,
) -> TransferOutcome {
    let digest = &layer.blob_sum;

    let stream = match source.client.download_blob(&source.image, digest).await {
        Ok(stream) => stream,
        Err(error) => {
            debug!(digest = digest.short(), %error, "download failed");
            return TransferOutcome {
                layer,
                download_error: Some(error),
                upload_error: None,
            };
        }
    };

    // Errors raised while reading the source are kept apart from upload errors.
    let read_error: Arc<Mutex<Option<RegistryError>>> = Arc::new(Mutex::new(None));
    let stream = {
        let read_error = Arc::clone(&read_error);
        stream
            .inspect(move |chunk| {
                if let Err(error) = chunk {
                    if let Ok(mut slot) = read_error.lock() {
                        slot.get_or_insert_with(|| error.clone());
                    }
                }
            })
            .boxed()
    };
    let stream = CountingStream::wrap(stream, counter);

    let upload_error = destination
        .client
        .upload_blob(&destination.image, digest, stream)
        .await
        .err();
    let download_error = read_error.lock().ok().and_then(|mut slot| slot.take());

    debug!(
        digest = digest.short(),
        download_ok = download_error.is_none(),
        upload_ok = upload_error.is_none(),
        "layer transferred"
    );

    TransferOutcome {
        layer,
        download_error,
        upload_error,
    }
}

//! Layer metadata and destination existence checks
//!
//! Each unique layer goes through two pools in sequence: size lookup against
//! the source, then a presence probe against the destination. The pools are
//! sized separately since they load different registries.

use crate::concurrency::{WorkerPool, fan_in};
use crate::error::RegistryError;
use crate::image::FsLayer;
use crate::progress::StageProgress;
use crate::promote::Endpoint;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LayerCheck {
    pub layer: FsLayer,
    pub size: u64,
    pub present: bool,
    pub error: Option<RegistryError>,
}

impl LayerCheck {
    /// Only layers with known size that the destination lacks are transferred.
    pub fn needs_transfer(&self) -> bool {
        self.error.is_none() && !self.present
    }
}

/// Sum of the sizes of all layers that will be transferred
pub fn transfer_size(checks: &[LayerCheck]) -> u64 {
    checks
        .iter()
        .filter(|check| check.needs_transfer())
        .map(|check| check.size)
        .sum()
}

pub struct CheckPools {
    pub metadata_concurrency: usize,
    pub existence_concurrency: usize,
}

/// Check every layer, returning one record per layer in completion order.
/// A failed presence probe counts as absent.
pub async fn check_layers(
    source: &Endpoint,
    destination: &Endpoint,
    layers: &[FsLayer],
    pools: CheckPools,
    progress: Arc<dyn StageProgress>,
) -> Vec<LayerCheck> {
    let (source, source_image) = (Arc::clone(&source.client), source.image.clone());
    let (destination, destination_image) = (Arc::clone(&destination.client), destination.image.clone());

    let metadata = WorkerPool::new("layer-metadata", pools.metadata_concurrency, move |layer: FsLayer| {
        let source = Arc::clone(&source);
        let image = source_image.clone();
        async move {
            match source.blob_size(&image, &layer.blob_sum).await {
                Ok(size) => LayerCheck {
                    layer,
                    size,
                    present: false,
                    error: None,
                },
                Err(error) => LayerCheck {
                    layer,
                    size: 0,
                    present: false,
                    error: Some(error),
                },
            }
        }
    });

    let existence = WorkerPool::new("layer-exists", pools.existence_concurrency, move |mut check: LayerCheck| {
        let destination = Arc::clone(&destination);
        let image = destination_image.clone();
        async move {
            if check.error.is_some() {
                return check;
            }
            check.present = match destination.has_blob(&image, &check.layer.blob_sum).await {
                Ok(present) => present,
                Err(error) => {
                    debug!(digest = check.layer.blob_sum.short(), %error, "existence check failed, assuming absent");
                    false
                }
            };
            check
        }
    });

    let checks = fan_in(
        layers.to_vec(),
        |layer| {
            let metadata = metadata.clone();
            let existence = existence.clone();
            async move {
                let check = metadata.process(layer).await;
                existence.process(check).await
            }
        },
        |layer, reason| LayerCheck {
            layer,
            size: 0,
            present: false,
            error: Some(RegistryError::Worker(reason)),
        },
        |_| progress.advance(1),
    )
    .await;
    progress.finish();
    checks
}

//! Manifest retrieval for the selected tags

use crate::concurrency::{WorkerPool, fan_in};
use crate::error::RegistryError;
use crate::image::SignedManifest;
use crate::progress::StageProgress;
use crate::promote::Endpoint;
use std::sync::Arc;
use tracing::debug;

/// Outcome of fetching one tag's manifest
#[derive(Debug, Clone)]
pub struct ManifestFetch {
    pub tag: String,
    pub result: Result<SignedManifest, RegistryError>,
    position: usize,
}

impl ManifestFetch {
    pub fn manifest(&self) -> Option<&SignedManifest> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&RegistryError> {
        self.result.as_ref().err()
    }
}

/// Fetch every tag's manifest from the source repository, at most
/// `concurrency` at a time. Returns one record per tag, in tag order.
pub async fn fetch_manifests(
    source: &Endpoint,
    tags: &[String],
    concurrency: usize,
    progress: Arc<dyn StageProgress>,
) -> Vec<ManifestFetch> {
    let (source, image) = (Arc::clone(&source.client), source.image.clone());
    let pool = WorkerPool::new("manifest-fetch", concurrency, move |(position, tag): (usize, String)| {
        let source = Arc::clone(&source);
        let image = image.clone();
        async move {
            let result = source.manifest(&image, &tag).await;
            debug!(tag = %tag, ok = result.is_ok(), "manifest fetched");
            ManifestFetch { tag, result, position }
        }
    });

    let jobs: Vec<(usize, String)> = tags.iter().cloned().enumerate().collect();
    let mut fetches = fan_in(
        jobs,
        |job| {
            let pool = pool.clone();
            async move { pool.process(job).await }
        },
        |(position, tag), reason| ManifestFetch {
            tag,
            result: Err(RegistryError::Worker(reason)),
            position,
        },
        |_| progress.advance(1),
    )
    .await;
    progress.finish();

    fetches.sort_by_key(|fetch| fetch.position);
    fetches
}

//! Re-signing and publishing manifests under the destination name

use crate::concurrency::{WorkerPool, fan_in};
use crate::error::{DeployError, RegistryError};
use crate::image::{Manifest, SignedManifest};
use crate::progress::StageProgress;
use crate::promote::Endpoint;
use crate::signing::ManifestSigner;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DeployOutcome {
    /// The destination-scoped manifest, as it was (or would have been) signed
    pub manifest: Manifest,
    pub result: Result<(), DeployError>,
}

impl DeployOutcome {
    pub fn reference(&self) -> String {
        self.manifest.reference()
    }
}

/// Sign each manifest for the destination repository and upload it under
/// its original tag. One key signs every manifest of the run; the upload
/// only happens when signing succeeded.
pub async fn deploy_manifests<S>(
    destination: &Endpoint,
    signer: Arc<S>,
    manifests: Vec<SignedManifest>,
    concurrency: usize,
    progress: Arc<dyn StageProgress>,
) -> Vec<DeployOutcome>
where
    S: ManifestSigner + 'static,
    S::Key: 'static,
{
    let image = destination.image.clone();

    let key = match signer.generate_key() {
        Ok(key) => Arc::new(key),
        Err(error) => {
            let outcomes: Vec<DeployOutcome> = manifests
                .iter()
                .map(|source| DeployOutcome {
                    manifest: source.manifest.for_destination(&image),
                    result: Err(DeployError::Sign(error.clone())),
                })
                .collect();
            progress.advance(outcomes.len() as u64);
            progress.finish();
            return outcomes;
        }
    };

    let client = Arc::clone(&destination.client);
    let pool = WorkerPool::new("manifest-deploy", concurrency, move |source: SignedManifest| {
        let client = Arc::clone(&client);
        let signer = Arc::clone(&signer);
        let key = Arc::clone(&key);
        let image = image.clone();
        async move {
            let manifest = source.manifest.for_destination(&image);
            let signed = match signer.sign(&manifest, &key) {
                Ok(signed) => signed,
                Err(error) => {
                    return DeployOutcome {
                        manifest,
                        result: Err(DeployError::Sign(error)),
                    };
                }
            };

            let result = client
                .put_manifest(&image, &manifest.tag, &signed)
                .await
                .map_err(DeployError::Upload);
            debug!(reference = %manifest.reference(), ok = result.is_ok(), "manifest deployed");

            DeployOutcome { manifest, result }
        }
    });

    let outcomes = fan_in(
        manifests,
        |manifest| {
            let pool = pool.clone();
            async move { pool.process(manifest).await }
        },
        |source, reason| DeployOutcome {
            manifest: source.manifest.for_destination(&destination.image),
            result: Err(DeployError::Upload(RegistryError::Worker(reason))),
        },
        |_| progress.advance(1),
    )
    .await;
    progress.finish();
    outcomes
}

//! Tag promotion pipeline
//!
//! Stages run strictly one after another, each fully drained before the
//! next starts:
//!
//! 1. [`tags::select_tags`] filters the source tag list
//! 2. [`fetch::fetch_manifests`] retrieves one manifest per tag
//! 3. [`dedup::LayerSet`] collapses layers shared between manifests
//! 4. [`check::check_layers`] looks up sizes and destination presence
//! 5. [`transfer::transfer_layers`] streams the missing blobs across
//! 6. [`deploy::deploy_manifests`] re-signs and uploads each manifest
//! 7. [`report::PushReport`] decides the outcome
//!
//! Items fail independently. Only tag listing and tag selection abort a run.

pub mod check;
pub mod dedup;
pub mod deploy;
pub mod fetch;
pub mod report;
pub mod tags;
pub mod transfer;

use crate::config::TagPushJob;
use crate::error::PromoteError;
use crate::logging::Logger;
use crate::progress::{ProgressFactory, ProgressUnit};
use crate::registry::RegistryClient;
use crate::signing::ManifestSigner;
use std::sync::Arc;
use tracing::debug;

pub use check::LayerCheck;
pub use dedup::LayerSet;
pub use deploy::DeployOutcome;
pub use fetch::ManifestFetch;
pub use report::{Failure, FailureKind, PushReport};
pub use tags::select_tags;
pub use transfer::{TransferOutcome, TransferSummary};

/// A repository on a registry
#[derive(Clone)]
pub struct Endpoint {
    pub client: Arc<dyn RegistryClient>,
    pub image: String,
}

impl Endpoint {
    pub fn new(client: Arc<dyn RegistryClient>, image: impl Into<String>) -> Self {
        Self {
            client,
            image: image.into(),
        }
    }
}

pub struct TagPusher<S> {
    job: TagPushJob,
    source: Endpoint,
    destination: Endpoint,
    signer: Arc<S>,
    progress: Arc<dyn ProgressFactory>,
    logger: Logger,
}

impl<S> TagPusher<S>
where
    S: ManifestSigner + 'static,
    S::Key: 'static,
{
    pub fn new(
        job: TagPushJob,
        source: Arc<dyn RegistryClient>,
        destination: Arc<dyn RegistryClient>,
        signer: S,
        progress: Arc<dyn ProgressFactory>,
        logger: Logger,
    ) -> Self {
        let source = Endpoint::new(source, job.source.image.clone());
        let destination = Endpoint::new(destination, job.destination.image.clone());
        Self {
            job,
            source,
            destination,
            signer: Arc::new(signer),
            progress,
            logger,
        }
    }

    pub async fn run(&self) -> Result<PushReport, PromoteError> {
        let pipeline = &self.job.pipeline;

        self.logger.section("Preparing tags push");
        self.logger.info(&format!("Source image: {}", self.source.image));
        self.logger.info(&format!("Destination image: {}", self.destination.image));

        let tags = self
            .source
            .client
            .tags(&self.source.image)
            .await
            .map_err(PromoteError::ListTags)?;
        self.logger.info(&format!("Source image contains {} tags", tags.len()));

        let tags = select_tags(tags, self.job.tag_regexp.as_deref())?;
        if self.job.tag_regexp.is_some() {
            self.logger.info(&format!("Tag regexp matched {} tags", tags.len()));
        }

        self.logger.section("Retrieving manifests");
        let fetches = fetch::fetch_manifests(
            &self.source,
            &tags,
            pipeline.manifest_concurrency,
            self.progress.stage("manifests", tags.len() as u64, ProgressUnit::Items),
        )
        .await;

        let layers = LayerSet::from_manifests(fetches.iter().filter_map(ManifestFetch::manifest));
        self.logger.info(&format!("Total number of layers {}", layers.total_references));
        if layers.duplicates() > 0 {
            self.logger.info(&format!(
                "Reducing transfer size by skipping duplicate layers. Duplicate layers skipped: {}",
                layers.duplicates()
            ));
        }

        self.logger.section("Retrieving layer metadata and optimising transfer");
        let checks = check::check_layers(
            &self.source,
            &self.destination,
            &layers.unique,
            check::CheckPools {
                metadata_concurrency: pipeline.metadata_concurrency,
                existence_concurrency: pipeline.existence_concurrency,
            },
            self.progress.stage("layer check", layers.len() as u64, ProgressUnit::Items),
        )
        .await;

        let transfer_size = check::transfer_size(&checks);
        let pending = checks.iter().filter(|check| check.needs_transfer()).count();
        self.logger.section("Transferring layers");
        self.logger.info(&format!(
            "{} of {} layers missing at destination ({})",
            pending,
            checks.len(),
            self.logger.format_size(transfer_size)
        ));
        let transfers = transfer::transfer_layers(
            &self.source,
            &self.destination,
            &checks,
            pipeline.transfer_concurrency,
            self.progress.stage("transfer", transfer_size * 2, ProgressUnit::Bytes),
        )
        .await;

        self.logger.section("Uploading manifest files");
        let manifests: Vec<_> = fetches
            .iter()
            .filter_map(ManifestFetch::manifest)
            .cloned()
            .collect();
        let deploy_progress = self.progress.stage("deploy", manifests.len() as u64, ProgressUnit::Items);
        let deployments = deploy::deploy_manifests(
            &self.destination,
            Arc::clone(&self.signer),
            manifests,
            pipeline.deploy_concurrency,
            deploy_progress,
        )
        .await;

        debug!(
            tags = fetches.len(),
            layers = layers.len(),
            transferred = transfers.outcomes.len(),
            deployed = deployments.len(),
            "promotion finished"
        );

        Ok(PushReport {
            source_image: self.source.image.clone(),
            fetches,
            layers,
            checks,
            transfers,
            deployments,
        })
    }
}

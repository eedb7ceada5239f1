//! Final accounting of a promotion run

use crate::logging::Logger;
use crate::promote::check::LayerCheck;
use crate::promote::dedup::LayerSet;
use crate::promote::deploy::DeployOutcome;
use crate::promote::fetch::ManifestFetch;
use crate::promote::transfer::TransferSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ManifestFetch,
    ManifestDeploy,
    LayerMetadata,
    LayerDownload,
    LayerUpload,
}

impl FailureKind {
    pub fn describe(self) -> &'static str {
        match self {
            FailureKind::ManifestFetch => "unable to retrieve image manifest",
            FailureKind::ManifestDeploy => "unable to deploy image manifest",
            FailureKind::LayerMetadata => "unable to retrieve layer metadata",
            FailureKind::LayerDownload => "unable to download layer",
            FailureKind::LayerUpload => "unable to upload layer",
        }
    }
}

/// One failed item: an `image:tag` for manifests, a digest for layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub subject: String,
    pub kind: FailureKind,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct PushReport {
    pub source_image: String,
    pub fetches: Vec<ManifestFetch>,
    pub layers: LayerSet,
    pub checks: Vec<LayerCheck>,
    pub transfers: TransferSummary,
    pub deployments: Vec<DeployOutcome>,
}

impl PushReport {
    /// Manifest-level failures. Any of these fails the run.
    pub fn failures(&self) -> Vec<Failure> {
        let fetch_failures = self.fetches.iter().filter_map(|fetch| {
            fetch.error().map(|error| Failure {
                subject: format!("{}:{}", self.source_image, fetch.tag),
                kind: FailureKind::ManifestFetch,
                error: error.to_string(),
            })
        });

        let deploy_failures = self.deployments.iter().filter_map(|outcome| {
            outcome.result.as_ref().err().map(|error| Failure {
                subject: outcome.reference(),
                kind: FailureKind::ManifestDeploy,
                error: error.to_string(),
            })
        });

        fetch_failures.chain(deploy_failures).collect()
    }

    /// Layer-level failures. Reported, but they do not fail the run.
    pub fn layer_failures(&self) -> Vec<Failure> {
        let metadata = self.checks.iter().filter_map(|check| {
            check.error.as_ref().map(|error| Failure {
                subject: check.layer.blob_sum.to_string(),
                kind: FailureKind::LayerMetadata,
                error: error.to_string(),
            })
        });

        let transfers = self.transfers.outcomes.iter().flat_map(|outcome| {
            let subject = outcome.layer.blob_sum.to_string();
            let download = outcome.download_error.as_ref().map(|error| Failure {
                subject: subject.clone(),
                kind: FailureKind::LayerDownload,
                error: error.to_string(),
            });
            let upload = outcome.upload_error.as_ref().map(|error| Failure {
                subject,
                kind: FailureKind::LayerUpload,
                error: error.to_string(),
            });
            download.into_iter().chain(upload)
        });

        metadata.chain(transfers).collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn deployed(&self) -> usize {
        self.deployments.iter().filter(|d| d.result.is_ok()).count()
    }

    pub fn print(&self, logger: &Logger) {
        logger.summary_kv(
            "Promotion summary",
            &[
                ("Tags", self.fetches.len().to_string()),
                ("Unique layers", self.layers.len().to_string()),
                ("Layers transferred", self.transfers.outcomes.iter().filter(|o| o.is_success()).count().to_string()),
                ("Bytes moved", logger.format_size(self.transfers.progress_bytes / 2)),
                ("Manifests deployed", self.deployed().to_string()),
            ],
        );

        for failure in self.layer_failures() {
            logger.warning(&format!(
                "Layer {}: {}. Error: {}",
                failure.subject,
                failure.kind.describe(),
                failure.error
            ));
        }

        for failure in self.failures() {
            logger.error(&format!(
                "Failed to push image {} because {}. Error: {}",
                failure.subject,
                failure.kind.describe(),
                failure.error
            ));
        }
    }
}

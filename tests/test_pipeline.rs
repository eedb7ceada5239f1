use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tag_promoter::config::{PipelineConfig, RegistryConfig, TagPushJob};
use tag_promoter::error::{PromoteError, RegistryError, Result, SigningError};
use tag_promoter::image::{Digest, FsLayer, History, Manifest, SignedManifest};
use tag_promoter::logging::Logger;
use tag_promoter::progress::{ProgressFactory, ProgressUnit, SilentProgress, StageProgress};
use tag_promoter::promote::check::{CheckPools, check_layers};
use tag_promoter::promote::{Endpoint, FailureKind, PushReport, TagPusher};
use tag_promoter::registry::{BlobStream, RegistryClient};
use tag_promoter::signing::{ManifestSigner, TrustSigner};

const SOURCE_IMAGE: &str = "team/app";
const DEST_IMAGE: &str = "mirror/app";

/// In-memory registry with per-operation failure injection
#[derive(Default)]
struct FakeRegistry {
    tags: Vec<String>,
    manifests: HashMap<String, SignedManifest>,
    blobs: Mutex<HashMap<Digest, Bytes>>,
    fail_tags: bool,
    fail_manifest: HashSet<String>,
    fail_size: HashSet<Digest>,
    fail_exists: HashSet<Digest>,
    fail_download: HashSet<Digest>,
    fail_put_manifest: HashSet<String>,
    log: Mutex<CallLog>,
}

#[derive(Default, Clone)]
struct CallLog {
    manifest_gets: Vec<String>,
    downloads: Vec<Digest>,
    uploads: Vec<Digest>,
    deployed: Vec<(String, String, Vec<u8>)>,
}

impl FakeRegistry {
    fn with_blobs(blobs: &[&'static [u8]]) -> Self {
        let registry = FakeRegistry::default();
        {
            let mut stored = registry.blobs.lock().unwrap();
            for blob in blobs {
                stored.insert(Digest::sha256(blob), Bytes::from_static(blob));
            }
        }
        registry
    }

    fn with_image(mut self, tag: &str, layers: &[&[u8]]) -> Self {
        let manifest = Manifest {
            schema_version: 1,
            name: SOURCE_IMAGE.to_string(),
            tag: tag.to_string(),
            architecture: "amd64".to_string(),
            fs_layers: layers.iter().map(|l| FsLayer::new(Digest::sha256(l))).collect(),
            history: layers
                .iter()
                .map(|_| History {
                    v1_compatibility: "{}".to_string(),
                })
                .collect(),
        };
        let raw = serde_json::to_vec(&manifest).unwrap();
        self.tags.push(tag.to_string());
        self.manifests.insert(tag.to_string(), SignedManifest::new(manifest, raw));
        self
    }

    fn calls(&self) -> CallLog {
        self.log.lock().unwrap().clone()
    }

    fn holds(&self, digest: &Digest) -> bool {
        self.blobs.lock().unwrap().contains_key(digest)
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn tags(&self, _image: &str) -> Result<Vec<String>> {
        if self.fail_tags {
            return Err(RegistryError::Network("connection refused".into()));
        }
        Ok(self.tags.clone())
    }

    async fn manifest(&self, _image: &str, tag: &str) -> Result<SignedManifest> {
        self.log.lock().unwrap().manifest_gets.push(tag.to_string());
        if self.fail_manifest.contains(tag) {
            return Err(RegistryError::Registry {
                status: 500,
                message: "manifest unavailable".into(),
            });
        }
        self.manifests
            .get(tag)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(tag.to_string()))
    }

    async fn blob_size(&self, _image: &str, digest: &Digest) -> Result<u64> {
        if self.fail_size.contains(digest) {
            return Err(RegistryError::Network("timeout".into()));
        }
        self.blobs
            .lock()
            .unwrap()
            .get(digest)
            .map(|b| b.len() as u64)
            .ok_or_else(|| RegistryError::NotFound(digest.to_string()))
    }

    async fn has_blob(&self, _image: &str, digest: &Digest) -> Result<bool> {
        if self.fail_exists.contains(digest) {
            return Err(RegistryError::Network("timeout".into()));
        }
        Ok(self.holds(digest))
    }

    async fn download_blob(&self, _image: &str, digest: &Digest) -> Result<BlobStream> {
        self.log.lock().unwrap().downloads.push(digest.clone());
        if self.fail_download.contains(digest) {
            return Err(RegistryError::Network("reset by peer".into()));
        }
        let blob = self
            .blobs
            .lock()
            .unwrap()
            .get(digest)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(digest.to_string()))?;

        let middle = blob.len() / 2;
        let chunks = vec![Ok(blob.slice(..middle)), Ok(blob.slice(middle..))];
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn upload_blob(&self, _image: &str, digest: &Digest, body: BlobStream) -> Result<()> {
        let chunks: Vec<Bytes> = body.try_collect().await?;
        let content: Vec<u8> = chunks.concat();
        let mut log = self.log.lock().unwrap();
        log.uploads.push(digest.clone());
        self.blobs.lock().unwrap().insert(digest.clone(), Bytes::from(content));
        Ok(())
    }

    async fn put_manifest(&self, image: &str, tag: &str, manifest: &SignedManifest) -> Result<()> {
        if self.fail_put_manifest.contains(tag) {
            return Err(RegistryError::Registry {
                status: 400,
                message: "manifest invalid".into(),
            });
        }
        self.log
            .lock()
            .unwrap()
            .deployed
            .push((image.to_string(), tag.to_string(), manifest.raw().to_vec()));
        Ok(())
    }
}

/// Tracks the peak number of concurrent calls
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    async fn around<T>(&self, call: impl std::future::Future<Output = T>) -> T {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = call.await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Wraps a [`FakeRegistry`], measuring lookups and panicking on chosen tags
struct Instrumented {
    inner: FakeRegistry,
    panic_on_fetch: Option<&'static str>,
    panic_on_deploy: Option<&'static str>,
    sizes: Gauge,
    lookups: Gauge,
}

impl Instrumented {
    fn new(inner: FakeRegistry) -> Self {
        Self {
            inner,
            panic_on_fetch: None,
            panic_on_deploy: None,
            sizes: Gauge::default(),
            lookups: Gauge::default(),
        }
    }
}

#[async_trait]
impl RegistryClient for Instrumented {
    async fn tags(&self, image: &str) -> Result<Vec<String>> {
        self.inner.tags(image).await
    }

    async fn manifest(&self, image: &str, tag: &str) -> Result<SignedManifest> {
        if self.panic_on_fetch == Some(tag) {
            panic!("manifest parser bug on {}", tag);
        }
        self.inner.manifest(image, tag).await
    }

    async fn blob_size(&self, image: &str, digest: &Digest) -> Result<u64> {
        self.sizes.around(self.inner.blob_size(image, digest)).await
    }

    async fn has_blob(&self, image: &str, digest: &Digest) -> Result<bool> {
        self.lookups.around(self.inner.has_blob(image, digest)).await
    }

    async fn download_blob(&self, image: &str, digest: &Digest) -> Result<BlobStream> {
        self.inner.download_blob(image, digest).await
    }

    async fn upload_blob(&self, image: &str, digest: &Digest, body: BlobStream) -> Result<()> {
        self.inner.upload_blob(image, digest, body).await
    }

    async fn put_manifest(&self, image: &str, tag: &str, manifest: &SignedManifest) -> Result<()> {
        if self.panic_on_deploy == Some(tag) {
            panic!("manifest upload bug on {}", tag);
        }
        self.inner.put_manifest(image, tag, manifest).await
    }
}

/// Signer that echoes the manifest JSON back, or always fails
struct FakeSigner {
    fail_key: bool,
    fail_sign: bool,
}

impl FakeSigner {
    fn ok() -> Self {
        Self {
            fail_key: false,
            fail_sign: false,
        }
    }
}

impl ManifestSigner for FakeSigner {
    type Key = ();

    fn generate_key(&self) -> std::result::Result<(), SigningError> {
        if self.fail_key {
            return Err(SigningError::KeyGeneration("no entropy".into()));
        }
        Ok(())
    }

    fn sign(&self, manifest: &Manifest, _key: &()) -> std::result::Result<SignedManifest, SigningError> {
        if self.fail_sign {
            return Err(SigningError::Signature("hsm offline".into()));
        }
        let raw = serde_json::to_vec(manifest)?;
        Ok(SignedManifest::new(manifest.clone(), raw))
    }
}

/// Records the total each stage was told to advance by
#[derive(Default)]
struct CountingProgress {
    totals: Arc<Mutex<HashMap<String, (u64, bool)>>>,
}

struct StageCounter {
    name: String,
    totals: Arc<Mutex<HashMap<String, (u64, bool)>>>,
}

impl ProgressFactory for CountingProgress {
    fn stage(&self, name: &str, _length: u64, _unit: ProgressUnit) -> Arc<dyn StageProgress> {
        self.totals.lock().unwrap().insert(name.to_string(), (0, false));
        Arc::new(StageCounter {
            name: name.to_string(),
            totals: Arc::clone(&self.totals),
        })
    }
}

impl StageProgress for StageCounter {
    fn advance(&self, delta: u64) {
        if let Some(entry) = self.totals.lock().unwrap().get_mut(&self.name) {
            entry.0 += delta;
        }
    }

    fn finish(&self) {
        if let Some(entry) = self.totals.lock().unwrap().get_mut(&self.name) {
            entry.1 = true;
        }
    }
}

impl CountingProgress {
    fn total(&self, stage: &str) -> u64 {
        self.totals.lock().unwrap().get(stage).map(|e| e.0).unwrap_or_default()
    }

    fn finished(&self, stage: &str) -> bool {
        self.totals.lock().unwrap().get(stage).map(|e| e.1).unwrap_or_default()
    }
}

const L1: &[u8] = b"shared base layer";
const L2: &[u8] = b"layer only in v1";
const L3: &[u8] = b"layer only in version two";
const L4: &[u8] = b"layer only in v3";

fn job() -> TagPushJob {
    TagPushJob::new(
        RegistryConfig::new("source.test", SOURCE_IMAGE),
        RegistryConfig::new("dest.test", DEST_IMAGE),
    )
}

async fn promote_with<S, A, B>(
    job: TagPushJob,
    source: &Arc<A>,
    destination: &Arc<B>,
    signer: S,
    progress: &Arc<CountingProgress>,
) -> std::result::Result<PushReport, PromoteError>
where
    S: ManifestSigner + 'static,
    S::Key: 'static,
    A: RegistryClient + 'static,
    B: RegistryClient + 'static,
{
    let source: Arc<dyn RegistryClient> = Arc::clone(source) as Arc<dyn RegistryClient>;
    let destination: Arc<dyn RegistryClient> = Arc::clone(destination) as Arc<dyn RegistryClient>;
    let progress: Arc<dyn ProgressFactory> = Arc::clone(progress) as Arc<dyn ProgressFactory>;
    TagPusher::new(job, source, destination, signer, progress, Logger::new_quiet())
        .run()
        .await
}

fn two_tag_source() -> FakeRegistry {
    FakeRegistry::with_blobs(&[L1, L2, L3])
        .with_image("v1", &[L2, L1])
        .with_image("v2", &[L3, L1])
}

#[tokio::test]
async fn transfers_only_layers_missing_at_destination() {
    let source = Arc::new(two_tag_source());
    let destination = Arc::new(FakeRegistry::with_blobs(&[L1]));
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(job(), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    let downloads: HashSet<Digest> = source.calls().downloads.into_iter().collect();
    let expected: HashSet<Digest> = [Digest::sha256(L2), Digest::sha256(L3)].into_iter().collect();
    assert_eq!(downloads, expected);
    assert_eq!(source.calls().downloads.len(), 2);
    assert_eq!(report.transfers.outcomes.len(), 2);

    assert_eq!(report.layers.total_references, 4);
    assert_eq!(report.layers.len(), 3);

    let stored = destination.blobs.lock().unwrap().clone();
    assert_eq!(stored.get(&Digest::sha256(L2)).unwrap().as_ref(), L2);
    assert_eq!(stored.get(&Digest::sha256(L3)).unwrap().as_ref(), L3);

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.deployed(), 2);
}

#[tokio::test]
async fn byte_progress_counts_download_and_upload() {
    let source = Arc::new(two_tag_source());
    let destination = Arc::new(FakeRegistry::with_blobs(&[L1]));
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(job(), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    let expected = 2 * (L2.len() + L3.len()) as u64;
    assert_eq!(progress.total("transfer"), expected);
    assert_eq!(report.transfers.progress_bytes, expected);
    assert!(progress.finished("transfer"));
}

#[tokio::test]
async fn deploys_under_destination_name_with_original_tags() {
    let source = Arc::new(two_tag_source());
    let destination = Arc::new(FakeRegistry::default());
    let progress = Arc::new(CountingProgress::default());

    promote_with(job(), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    let mut deployed: Vec<(String, String)> = destination
        .calls()
        .deployed
        .into_iter()
        .map(|(image, tag, _)| (image, tag))
        .collect();
    deployed.sort();
    assert_eq!(
        deployed,
        vec![
            (DEST_IMAGE.to_string(), "v1".to_string()),
            (DEST_IMAGE.to_string(), "v2".to_string()),
        ]
    );
    assert_eq!(progress.total("deploy"), 2);
}

#[tokio::test]
async fn trust_signed_manifests_parse_back() {
    let source = Arc::new(two_tag_source());
    let destination = Arc::new(FakeRegistry::default());
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(job(), &source, &destination, TrustSigner::new(), &progress)
        .await
        .unwrap();
    assert!(report.is_success());

    for (_, tag, raw) in destination.calls().deployed {
        let signed = SignedManifest::from_bytes(raw).unwrap();
        assert_eq!(signed.manifest.name, DEST_IMAGE);
        assert_eq!(signed.manifest.tag, tag);

        let body: serde_json::Value = serde_json::from_slice(signed.raw()).unwrap();
        assert_eq!(body["signatures"].as_array().map(Vec::len), Some(1));
    }
}

#[tokio::test]
async fn failed_fetch_fails_run_and_names_tag() {
    let mut source = FakeRegistry::with_blobs(&[L1, L2, L3, L4])
        .with_image("v1", &[L2, L1])
        .with_image("v2", &[L3, L1])
        .with_image("v3", &[L4, L1]);
    source.fail_manifest.insert("v2".to_string());
    let source = Arc::new(source);
    let destination = Arc::new(FakeRegistry::default());
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(job(), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 1);
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, FailureKind::ManifestFetch);
    assert!(failures[0].subject.ends_with(":v2"));

    // v2's own layer is never referenced by a fetched manifest
    assert!(!destination.holds(&Digest::sha256(L3)));
    let deployed: HashSet<String> = destination.calls().deployed.into_iter().map(|d| d.1).collect();
    assert_eq!(deployed, ["v1".to_string(), "v3".to_string()].into_iter().collect());
}

#[tokio::test]
async fn destination_check_failure_means_missing() {
    let source = Arc::new(two_tag_source());
    let mut destination = FakeRegistry::with_blobs(&[L1]);
    destination.fail_exists.insert(Digest::sha256(L1));
    let destination = Arc::new(destination);
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(job(), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    let l1 = report
        .checks
        .iter()
        .find(|c| c.layer.blob_sum == Digest::sha256(L1))
        .unwrap();
    assert!(!l1.present);
    assert!(l1.error.is_none());
    assert!(source.calls().downloads.contains(&Digest::sha256(L1)));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn metadata_failure_is_never_transferred() {
    let mut source = two_tag_source();
    source.fail_size.insert(Digest::sha256(L2));
    let source = Arc::new(source);
    let destination = Arc::new(FakeRegistry::default());
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(job(), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    assert!(!source.calls().downloads.contains(&Digest::sha256(L2)));
    assert_eq!(source.calls().downloads.len(), 2);

    let layer_failures = report.layer_failures();
    assert_eq!(layer_failures.len(), 1);
    assert_eq!(layer_failures[0].kind, FailureKind::LayerMetadata);
    // layer problems are reported but do not fail the run
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn download_failure_skips_upload() {
    let mut source = two_tag_source();
    source.fail_download.insert(Digest::sha256(L3));
    let source = Arc::new(source);
    let destination = Arc::new(FakeRegistry::with_blobs(&[L1]));
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(job(), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    assert_eq!(destination.calls().uploads, vec![Digest::sha256(L2)]);
    assert_eq!(progress.total("transfer"), 2 * L2.len() as u64);
    assert_eq!(report.layer_failures()[0].kind, FailureKind::LayerDownload);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn tag_filter_preserves_order() {
    let source = Arc::new(
        FakeRegistry::with_blobs(&[L1])
            .with_image("v1.2", &[L1])
            .with_image("v2", &[L1])
            .with_image("v1.0", &[L1]),
    );
    let destination = Arc::new(FakeRegistry::default());
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(
        job().with_tag_regexp(r"^v1\."),
        &source,
        &destination,
        FakeSigner::ok(),
        &progress,
    )
    .await
    .unwrap();

    let fetched: Vec<&str> = report.fetches.iter().map(|f| f.tag.as_str()).collect();
    assert_eq!(fetched, vec!["v1.2", "v1.0"]);
    let mut requested = source.calls().manifest_gets;
    requested.sort();
    assert_eq!(requested, vec!["v1.0", "v1.2"]);
}

#[tokio::test]
async fn unmatched_pattern_stops_before_fetching() {
    let source = Arc::new(two_tag_source());
    let destination = Arc::new(FakeRegistry::default());
    let progress = Arc::new(CountingProgress::default());

    let err = promote_with(
        job().with_tag_regexp("^release-"),
        &source,
        &destination,
        FakeSigner::ok(),
        &progress,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PromoteError::NoMatchingTags { .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(source.calls().manifest_gets.is_empty());
}

#[tokio::test]
async fn invalid_pattern_and_tag_listing_are_fatal() {
    let source = Arc::new(two_tag_source());
    let destination = Arc::new(FakeRegistry::default());
    let progress = Arc::new(CountingProgress::default());

    let err = promote_with(job().with_tag_regexp("v(1"), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap_err();
    assert!(matches!(err, PromoteError::InvalidPattern(_)));

    let mut unreachable = two_tag_source();
    unreachable.fail_tags = true;
    let unreachable = Arc::new(unreachable);
    let err = promote_with(job(), &unreachable, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap_err();
    assert!(matches!(err, PromoteError::ListTags(_)));
}

#[tokio::test]
async fn signing_failure_blocks_upload() {
    let source = Arc::new(two_tag_source());
    let destination = Arc::new(FakeRegistry::default());
    let progress = Arc::new(CountingProgress::default());
    let signer = FakeSigner {
        fail_key: false,
        fail_sign: true,
    };

    let report = promote_with(job(), &source, &destination, signer, &progress)
        .await
        .unwrap();

    assert!(destination.calls().deployed.is_empty());
    assert_eq!(report.deployments.len(), 2);
    assert!(report.failures().iter().all(|f| f.kind == FailureKind::ManifestDeploy));
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn key_generation_failure_fails_every_deploy() {
    let source = Arc::new(two_tag_source());
    let destination = Arc::new(FakeRegistry::default());
    let progress = Arc::new(CountingProgress::default());
    let signer = FakeSigner {
        fail_key: true,
        fail_sign: false,
    };

    let report = promote_with(job(), &source, &destination, signer, &progress)
        .await
        .unwrap();

    assert!(destination.calls().deployed.is_empty());
    assert_eq!(report.failures().len(), 2);
    assert_eq!(progress.total("deploy"), 2);
    assert!(progress.finished("deploy"));
}

#[tokio::test]
async fn manifest_upload_failure_fails_run() {
    let source = Arc::new(two_tag_source());
    let mut destination = FakeRegistry::default();
    destination.fail_put_manifest.insert("v1".to_string());
    let destination = Arc::new(destination);
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(job(), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].subject, format!("{}:v1", DEST_IMAGE));
    assert_eq!(report.deployed(), 1);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn every_stage_yields_one_record_per_item() {
    let layers: Vec<&'static [u8]> = ["one", "two", "three", "four", "five", "six", "seven", "eight"]
        .into_iter()
        .map(|name| name.as_bytes())
        .collect();
    let mut source = FakeRegistry::with_blobs(&layers);
    for (i, pair) in layers.chunks(2).enumerate() {
        source = source.with_image(&format!("t{}", i), pair);
    }
    source.fail_manifest.insert("t3".to_string());
    source.fail_size.insert(Digest::sha256(b"one".as_slice()));
    source.fail_download.insert(Digest::sha256(b"three".as_slice()));
    let source = Arc::new(source);

    let mut destination = FakeRegistry::with_blobs(&[b"four".as_slice()]);
    destination.fail_exists.insert(Digest::sha256(b"five".as_slice()));
    let destination = Arc::new(destination);
    let progress = Arc::new(CountingProgress::default());

    let pipeline = PipelineConfig {
        manifest_concurrency: 1,
        metadata_concurrency: 2,
        existence_concurrency: 1,
        transfer_concurrency: 2,
        deploy_concurrency: 1,
    };
    let report = promote_with(job().with_pipeline(pipeline), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    assert_eq!(report.fetches.len(), 4);
    assert_eq!(progress.total("manifests"), 4);
    assert_eq!(report.layers.len(), 6);
    assert_eq!(report.checks.len(), 6);
    assert_eq!(progress.total("layer check"), 6);
    // "one" failed its size lookup, "four" is already there
    assert_eq!(report.transfers.outcomes.len(), 4);
    assert_eq!(report.deployments.len(), 3);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn panicking_fetch_still_fails_the_tag() {
    let mut source = Instrumented::new(two_tag_source());
    source.panic_on_fetch = Some("v2");
    let source = Arc::new(source);
    let destination = Arc::new(FakeRegistry::default());
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(job(), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    assert_eq!(report.fetches.len(), 2);
    assert_eq!(progress.total("manifests"), 2);
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, FailureKind::ManifestFetch);
    assert_eq!(failures[0].subject, format!("{}:v2", SOURCE_IMAGE));
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn panicking_deploy_still_fails_the_tag() {
    let source = Arc::new(two_tag_source());
    let mut destination = Instrumented::new(FakeRegistry::default());
    destination.panic_on_deploy = Some("v1");
    let destination = Arc::new(destination);
    let progress = Arc::new(CountingProgress::default());

    let report = promote_with(job(), &source, &destination, FakeSigner::ok(), &progress)
        .await
        .unwrap();

    assert_eq!(report.deployments.len(), 2);
    assert_eq!(report.deployed(), 1);
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].subject, format!("{}:v1", DEST_IMAGE));
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn layer_check_pools_keep_separate_limits() {
    let blobs: Vec<&'static [u8]> = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l"]
        .into_iter()
        .map(|name| name.as_bytes())
        .collect();
    let layers: Vec<FsLayer> = blobs.iter().map(|b| FsLayer::new(Digest::sha256(b))).collect();

    let source = Arc::new(Instrumented::new(FakeRegistry::with_blobs(&blobs)));
    let destination = Arc::new(Instrumented::new(FakeRegistry::with_blobs(&blobs[..4])));

    let checks = check_layers(
        &Endpoint::new(Arc::clone(&source) as Arc<dyn RegistryClient>, SOURCE_IMAGE),
        &Endpoint::new(Arc::clone(&destination) as Arc<dyn RegistryClient>, DEST_IMAGE),
        &layers,
        CheckPools {
            metadata_concurrency: 3,
            existence_concurrency: 1,
        },
        Arc::new(SilentProgress),
    )
    .await;

    assert_eq!(checks.len(), 12);
    assert_eq!(checks.iter().filter(|c| c.present).count(), 4);
    assert_eq!(source.sizes.peak(), 3);
    assert_eq!(destination.lookups.peak(), 1);
}

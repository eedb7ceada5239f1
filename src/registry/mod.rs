//! Registry module for Docker registry interactions
//!
//! [`RegistryClient`] is the capability the promotion pipeline consumes. It is
//! used in both roles: reads against the source, writes against the destination.
//! [`HttpRegistryClient`] implements it over the Docker Registry HTTP API v2.

pub mod auth;
pub mod client;

use crate::error::{RegistryError, Result};
use crate::image::{Digest, SignedManifest};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub use auth::Challenge;
pub use client::{HttpRegistryClient, RegistryClientBuilder};

/// Blob content as it flows from a download into an upload. Dropping the
/// stream releases the underlying connection.
pub type BlobStream = BoxStream<'static, std::result::Result<Bytes, RegistryError>>;

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// All tags of `image`, in the order the registry returns them
    async fn tags(&self, image: &str) -> Result<Vec<String>>;

    async fn manifest(&self, image: &str, tag: &str) -> Result<SignedManifest>;

    /// Size in bytes of the blob, without downloading it
    async fn blob_size(&self, image: &str, digest: &Digest) -> Result<u64>;

    async fn has_blob(&self, image: &str, digest: &Digest) -> Result<bool>;

    async fn download_blob(&self, image: &str, digest: &Digest) -> Result<BlobStream>;

    async fn upload_blob(&self, image: &str, digest: &Digest, body: BlobStream) -> Result<()>;

    async fn put_manifest(&self, image: &str, tag: &str, manifest: &SignedManifest) -> Result<()>;
}

//! Manifest signing
//!
//! Schema-1 manifests carry a JWS over their own JSON. Changing the
//! repository name invalidates the source signature, so each promoted
//! manifest is re-signed with a key generated for the run.

pub mod trust;

use crate::error::SigningError;
use crate::image::{Manifest, SignedManifest};

pub use trust::{TrustKey, TrustSigner};

pub trait ManifestSigner: Send + Sync {
    type Key: Send + Sync;

    fn generate_key(&self) -> Result<Self::Key, SigningError>;

    fn sign(&self, manifest: &Manifest, key: &Self::Key) -> Result<SignedManifest, SigningError>;
}

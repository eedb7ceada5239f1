//! Schema 1 image manifests
//!
//! A signed schema-1 manifest is the JSON document below with a `signatures`
//! member spliced in before the closing brace. The raw bytes are kept next to
//! the parsed form because a registry verifies signatures against them.

use crate::error::{RegistryError, Result};
use crate::image::Digest;
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

/// Media type of a signed schema-1 manifest
pub const MEDIA_TYPE_SIGNED: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";

/// Media type of an unsigned schema-1 manifest
pub const MEDIA_TYPE_UNSIGNED: &str = "application/vnd.docker.distribution.manifest.v1+json";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FsLayer {
    #[serde(rename = "blobSum")]
    pub blob_sum: Digest,
}

impl FsLayer {
    pub fn new(blob_sum: Digest) -> Self {
        Self { blob_sum }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// Unsigned manifest body. Field order matches the canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub name: String,
    pub tag: String,
    pub architecture: String,
    pub fs_layers: Vec<FsLayer>,
    pub history: Vec<History>,
}

impl Manifest {
    /// Copy of this manifest scoped to another repository name.
    pub fn for_destination(&self, image: &str) -> Manifest {
        Manifest {
            schema_version: SCHEMA_VERSION,
            name: image.to_string(),
            tag: self.tag.clone(),
            architecture: self.architecture.clone(),
            fs_layers: self.fs_layers.clone(),
            history: self.history.clone(),
        }
    }

    /// `name:tag`
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

/// A manifest together with the exact bytes that carry its signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedManifest {
    pub manifest: Manifest,
    raw: Vec<u8>,
}

impl SignedManifest {
    pub fn new(manifest: Manifest, raw: Vec<u8>) -> Self {
        Self { manifest, raw }
    }

    /// Parse the body of a manifest GET. Unknown members such as
    /// `signatures` are ignored by the parsed form and kept in `raw`.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(&raw)?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(RegistryError::Parse(format!(
                "unsupported manifest schema version {}",
                manifest.schema_version
            )));
        }
        Ok(Self { manifest, raw })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn layers(&self) -> impl Iterator<Item = &FsLayer> {
        self.manifest.fs_layers.iter()
    }
}

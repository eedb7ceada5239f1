//! Image model: digests and schema-1 manifests

pub mod digest;
pub mod manifest;

pub use digest::Digest;
pub use manifest::{FsLayer, History, Manifest, SignedManifest};

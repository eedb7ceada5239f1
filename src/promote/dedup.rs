//! Cross-manifest layer deduplication

use crate::image::{FsLayer, SignedManifest};
use std::collections::HashSet;

/// Unique layers across a set of manifests, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerSet {
    pub unique: Vec<FsLayer>,
    pub total_references: usize,
}

impl LayerSet {
    pub fn from_manifests<'a>(manifests: impl IntoIterator<Item = &'a SignedManifest>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        let mut total_references = 0;

        for layer in manifests.into_iter().flat_map(|manifest| manifest.layers()) {
            total_references += 1;
            if seen.insert(&layer.blob_sum) {
                unique.push(layer.clone());
            }
        }

        Self {
            unique,
            total_references,
        }
    }

    /// References elided because an earlier manifest (or layer) had the same digest
    pub fn duplicates(&self) -> usize {
        self.total_references - self.unique.len()
    }

    pub fn len(&self) -> usize {
        self.unique.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unique.is_empty()
    }
}

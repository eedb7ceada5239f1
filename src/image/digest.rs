//! Content-addressed digests used to identify blobs
//!
//! A [`Digest`] is `algorithm:hex`. Schema-1 manifests almost always carry
//! `sha256`, but the registry protocol also allows `sha384`/`sha512`.

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Compute the sha256 digest of `data`
    pub fn sha256(data: &[u8]) -> Self {
        let hash = sha2::Sha256::digest(data);
        Digest(format!("sha256:{}", hex::encode(hash)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(alg, _)| alg).unwrap_or_default()
    }

    pub fn hex(&self) -> &str {
        self.0.split_once(':').map(|(_, hex)| hex).unwrap_or_default()
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> &str {
        let hex = self.hex();
        &hex[..hex.len().min(12)]
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| RegistryError::Validation(format!("digest missing algorithm: {}", s)))?;

        let expected_len = match algorithm {
            "sha256" => 64,
            "sha384" => 96,
            "sha512" => 128,
            other => {
                return Err(RegistryError::Validation(format!(
                    "unsupported digest algorithm {:?} in {}",
                    other, s
                )));
            }
        };

        if encoded.len() != expected_len || hex::decode(encoded).is_err() {
            return Err(RegistryError::Validation(format!(
                "invalid {} digest: {}",
                algorithm, s
            )));
        }

        // hex::decode accepts uppercase, registries do not
        if encoded.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(RegistryError::Validation(format!("digest must be lowercase: {}", s)));
        }

        Ok(Digest(s.to_string()))
    }
}

impl TryFrom<String> for Digest {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

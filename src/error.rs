//! Error types for tag promotion
//!
//! Registry and signing errors are carried per item inside stage result records.
//! Only [`PromoteError`] aborts a run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    /// Network related errors
    #[error("Network error: {0}")]
    Network(String),
    /// Registry answered with an unexpected status
    #[error("Registry error (status {status}): {message}")]
    Registry { status: u16, message: String },
    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),
    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Upload errors
    #[error("Upload error: {0}")]
    Upload(String),
    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    /// File IO errors
    #[error("IO error: {0}")]
    Io(String),
    /// The task handling this item ended without reporting back
    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Network(err.to_string())
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(err: url::ParseError) -> Self {
        RegistryError::Validation(err.to_string())
    }
}

#[derive(Error, Debug, Clone)]
pub enum SigningError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
    #[error("Manifest serialization failed: {0}")]
    Serialization(String),
    #[error("Signature failed: {0}")]
    Signature(String),
}

impl From<serde_json::Error> for SigningError {
    fn from(err: serde_json::Error) -> Self {
        SigningError::Serialization(err.to_string())
    }
}

/// Failure of a single manifest deployment.
#[derive(Error, Debug, Clone)]
pub enum DeployError {
    #[error("unable to sign image manifest: {0}")]
    Sign(#[from] SigningError),
    #[error("unable to deploy image manifest: {0}")]
    Upload(#[source] RegistryError),
}

/// Conditions that stop a run before any transfer happens.
#[derive(Error, Debug)]
pub enum PromoteError {
    #[error("failed to list source image tags: {0}")]
    ListTags(#[source] RegistryError),
    #[error("failed to filter by provided tag regexp: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("tag regexp {pattern:?} didn't match any tags")]
    NoMatchingTags { pattern: String },
    #[error("configuration error: {0}")]
    Config(String),
}

impl PromoteError {
    pub fn exit_code(&self) -> i32 {
        1
    }
}

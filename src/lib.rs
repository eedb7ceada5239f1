//! Tag Promoter Library
//!
//! Copies every selected tag of a repository from one registry to another.
//! Layers shared between tags are transferred once, layers already present at
//! the destination are skipped, and each manifest is re-signed before upload.

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod progress;
pub mod promote;
pub mod registry;
pub mod signing;

pub use config::{AuthConfig, PipelineConfig, RegistryConfig, TagPushJob};
pub use error::{DeployError, PromoteError, RegistryError, Result, SigningError};
pub use promote::{PushReport, TagPusher};

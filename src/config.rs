//! Configuration module for registry endpoints, credentials and pool sizes

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// One end of a promotion: a registry and the repository inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub address: String,
    pub image: String,
    pub auth: AuthConfig,
    pub insecure: bool,
}

impl RegistryConfig {
    pub fn new(address: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            image: image.into(),
            auth: AuthConfig::default(),
            insecure: false,
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Registry address with a scheme. Bare hosts get `https://`, or
    /// `http://` when the endpoint is marked insecure.
    pub fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.contains("://") {
            address.to_string()
        } else if self.insecure {
            format!("http://{}", address)
        } else {
            format!("https://{}", address)
        }
    }
}

/// Worker pool sizes, one per stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub manifest_concurrency: usize,
    pub metadata_concurrency: usize,
    pub existence_concurrency: usize,
    pub transfer_concurrency: usize,
    pub deploy_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            manifest_concurrency: 5,
            metadata_concurrency: 10,
            existence_concurrency: 5,
            transfer_concurrency: 5,
            deploy_concurrency: 5,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        let pools = [
            ("manifest", self.manifest_concurrency),
            ("metadata", self.metadata_concurrency),
            ("existence", self.existence_concurrency),
            ("transfer", self.transfer_concurrency),
            ("deploy", self.deploy_concurrency),
        ];
        for (name, size) in pools {
            if size == 0 {
                return Err(format!("{} concurrency must be at least 1", name));
            }
        }
        Ok(())
    }
}

/// Everything a promotion run needs, fixed before the first request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPushJob {
    pub source: RegistryConfig,
    pub destination: RegistryConfig,
    pub tag_regexp: Option<String>,
    pub debug: bool,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl TagPushJob {
    pub fn new(source: RegistryConfig, destination: RegistryConfig) -> Self {
        Self {
            source,
            destination,
            tag_regexp: None,
            debug: false,
            pipeline: PipelineConfig::default(),
        }
    }

    pub fn with_tag_regexp(mut self, pattern: impl Into<String>) -> Self {
        self.tag_regexp = Some(pattern.into());
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }
}

//! Command-line argument parsing

use crate::config::{AuthConfig, PipelineConfig, RegistryConfig, TagPushJob};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "tag-promoter")]
#[command(about = "Promote image tags from a source registry to a destination registry")]
#[command(version)]
pub struct Args {
    /// Source registry address
    #[arg(long = "src-registry", env = "SRC_REGISTRY", help = "Source registry address, e.g. registry.example.com:5000")]
    pub src_registry: String,

    /// Source image name
    #[arg(long = "src-image", env = "SRC_IMAGE", help = "Repository to read tags from")]
    pub src_image: String,

    #[arg(long = "src-username", env = "SRC_USERNAME", help = "Username for the source registry")]
    pub src_username: Option<String>,

    #[arg(long = "src-password", env = "SRC_PASSWORD", hide_env_values = true, help = "Password for the source registry")]
    pub src_password: Option<String>,

    #[arg(long = "src-insecure", env = "SRC_INSECURE", help = "Use plain HTTP or accept invalid certificates for the source")]
    pub src_insecure: bool,

    /// Destination registry address
    #[arg(long = "dest-registry", env = "DEST_REGISTRY", help = "Destination registry address")]
    pub dest_registry: String,

    /// Destination image name
    #[arg(long = "dest-image", env = "DEST_IMAGE", help = "Repository to publish tags under")]
    pub dest_image: String,

    #[arg(long = "dest-username", env = "DEST_USERNAME", help = "Username for the destination registry")]
    pub dest_username: Option<String>,

    #[arg(long = "dest-password", env = "DEST_PASSWORD", hide_env_values = true, help = "Password for the destination registry")]
    pub dest_password: Option<String>,

    #[arg(long = "dest-insecure", env = "DEST_INSECURE", help = "Use plain HTTP or accept invalid certificates for the destination")]
    pub dest_insecure: bool,

    /// Only promote tags matching this regular expression
    #[arg(long = "tag-regexp", short = 't', env = "TAG_REGEXP")]
    pub tag_regexp: Option<String>,

    /// Debug output
    #[arg(long = "debug", short = 'd', help = "Enable debug logging")]
    pub debug: bool,

    /// Suppress progress bars and narration
    #[arg(long = "quiet", short = 'q', conflicts_with = "debug")]
    pub quiet: bool,

    #[arg(long = "manifest-concurrency", default_value_t = 5, help = "Parallel manifest downloads")]
    pub manifest_concurrency: usize,

    #[arg(long = "metadata-concurrency", default_value_t = 10, help = "Parallel layer size lookups against the source")]
    pub metadata_concurrency: usize,

    #[arg(long = "existence-concurrency", default_value_t = 5, help = "Parallel layer presence checks against the destination")]
    pub existence_concurrency: usize,

    #[arg(long = "transfer-concurrency", default_value_t = 5, help = "Parallel layer transfers")]
    pub transfer_concurrency: usize,

    #[arg(long = "deploy-concurrency", default_value_t = 5, help = "Parallel manifest uploads")]
    pub deploy_concurrency: usize,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("source registry", &self.src_registry),
            ("source image", &self.src_image),
            ("destination registry", &self.dest_registry),
            ("destination image", &self.dest_image),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{} cannot be empty", name));
            }
        }

        if self.src_username.is_some() != self.src_password.is_some() {
            return Err("source username and password must be given together".into());
        }
        if self.dest_username.is_some() != self.dest_password.is_some() {
            return Err("destination username and password must be given together".into());
        }

        self.pipeline().validate()
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            manifest_concurrency: self.manifest_concurrency,
            metadata_concurrency: self.metadata_concurrency,
            existence_concurrency: self.existence_concurrency,
            transfer_concurrency: self.transfer_concurrency,
            deploy_concurrency: self.deploy_concurrency,
        }
    }

    pub fn to_job(&self) -> TagPushJob {
        let source = RegistryConfig::new(&self.src_registry, &self.src_image)
            .with_auth(AuthConfig::new(self.src_username.clone(), self.src_password.clone()))
            .with_insecure(self.src_insecure);
        let destination = RegistryConfig::new(&self.dest_registry, &self.dest_image)
            .with_auth(AuthConfig::new(self.dest_username.clone(), self.dest_password.clone()))
            .with_insecure(self.dest_insecure);

        TagPushJob {
            source,
            destination,
            tag_regexp: self.tag_regexp.clone().filter(|p| !p.is_empty()),
            debug: self.debug,
            pipeline: self.pipeline(),
        }
    }
}

//! Runner wiring parsed arguments into a promotion run

use crate::cli::args::Args;
use crate::config::TagPushJob;
use crate::error::PromoteError;
use crate::logging::Logger;
use crate::progress::{IndicatifProgress, ProgressFactory, SilentProgress};
use crate::promote::TagPusher;
use crate::registry::{HttpRegistryClient, RegistryClient};
use crate::signing::TrustSigner;
use std::sync::Arc;

pub struct Runner {
    job: TagPushJob,
    logger: Logger,
    progress: Arc<dyn ProgressFactory>,
}

impl Runner {
    pub fn new(args: &Args) -> Self {
        let (logger, progress): (Logger, Arc<dyn ProgressFactory>) = if args.quiet {
            (Logger::new_quiet(), Arc::new(SilentProgress))
        } else {
            (Logger::new(args.debug), Arc::new(IndicatifProgress))
        };

        Self {
            job: args.to_job(),
            logger,
            progress,
        }
    }

    /// Run the promotion and return the process exit code
    pub async fn run(&self) -> i32 {
        match self.promote().await {
            Ok(code) => code,
            Err(e) => {
                self.logger.error(&e.to_string());
                e.exit_code()
            }
        }
    }

    async fn promote(&self) -> Result<i32, PromoteError> {
        self.job.pipeline.validate().map_err(PromoteError::Config)?;

        let source = self.create_client(&self.job.source)?;
        let destination = self.create_client(&self.job.destination)?;

        let pusher = TagPusher::new(
            self.job.clone(),
            source,
            destination,
            TrustSigner::new(),
            Arc::clone(&self.progress),
            self.logger.clone(),
        );
        let report = pusher.run().await?;
        report.print(&self.logger);

        if report.is_success() {
            self.logger.success(&format!(
                "Promoted {} tags in {}",
                report.deployed(),
                self.logger.format_duration(self.logger.elapsed())
            ));
        }
        Ok(report.exit_code())
    }

    fn create_client(
        &self,
        config: &crate::config::RegistryConfig,
    ) -> Result<Arc<dyn RegistryClient>, PromoteError> {
        let access = if config.auth.has_credentials() { "authenticated" } else { "anonymous" };
        self.logger.detail(&format!("Connecting to {} ({})", config.base_url(), access));
        let client = HttpRegistryClient::from_config(config)
            .map_err(|e| PromoteError::Config(format!("{}: {}", config.address, e)))?;
        Ok(Arc::new(client))
    }
}

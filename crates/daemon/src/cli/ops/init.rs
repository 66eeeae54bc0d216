use clap::Args;

use common::store::ReplacementPolicy;
use q2q_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Port the daemon listens on
    #[arg(long, default_value_t = 8788)]
    pub listen_port: u16,

    /// Let a second self-signed certificate for a domain replace the first
    #[arg(long)]
    pub allow_replace: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig {
            listen_port: self.listen_port,
            ..AppConfig::default()
        };
        if self.allow_replace {
            config.certificates.replacement_policy = ReplacementPolicy::Replace;
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized q2q directory at: {}\n\
             - Database: {}\n\
             - Config: {}\n\
             - Listen port: {}",
            state.q2q_dir.display(),
            state.db_path.display(),
            state.config_path.display(),
            state.config.listen_port,
        );

        Ok(output)
    }
}

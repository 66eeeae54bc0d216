use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use common::identity::IdentityAddress;
use q2q_daemon::state::{AppState, StateError};
use q2q_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Identity to authenticate as (user@domain); the domain needs a private certificate
    #[arg(long)]
    pub identity: IdentityAddress,

    /// Override the listen port (default from config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the configured log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<tracing::Level>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        // Load state from config path (or default ~/.q2q)
        let state = AppState::load(ctx.config_path.clone())?;

        let port = self.port.unwrap_or(state.config.listen_port);
        let config = ServiceConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            identity: self.identity.clone(),
            sqlite_path: Some(state.db_path.clone()),
            store: state.config.store_config()?,
            handshake_timeout: state.config.handshake_timeout(),
            log_level: match self.log_level {
                Some(level) => level,
                None => state.config.log_level()?,
            },
            log_dir: self.log_dir.clone(),
        };

        spawn_service(&config).await;
        Ok("daemon ended".to_string())
    }
}

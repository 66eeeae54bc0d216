use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;

use common::certificate::{CertificateError, PrivateCertificate};
use common::identity::IdentityAddress;
use common::transport::{LocalCredentials, Q2QTransport, TransportError};
use q2q_daemon::listener::{read_greeting, ListenerError};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Connect {
    /// Daemon address, host:port
    pub addr: String,

    /// Identity to authenticate as (user@domain)
    #[arg(long)]
    pub identity: IdentityAddress,

    /// Private certificate (PEM) to present; defaults to the identity's
    /// domain certificate from the local store
    #[arg(long)]
    pub cert: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid private certificate: {0}")]
    Certificate(#[from] CertificateError),
    #[error("failed to connect to {0}: {1}")]
    Dial(String, std::io::Error),
    #[error("handshake with {0} timed out")]
    Timeout(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Greeting(#[from] ListenerError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Connect {
    type Error = ConnectError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (state, database) = ctx.open().await?;

        let credentials = match &self.cert {
            Some(path) => {
                let pem = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| ConnectError::Read(path.clone(), e))?;
                LocalCredentials::new(self.identity.clone(), PrivateCertificate::from_pem(&pem)?)?
            }
            None => LocalCredentials::from_store(self.identity.clone(), &database).await?,
        };

        let socket = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| ConnectError::Dial(self.addr.clone(), e))?;
        let mut transport = Q2QTransport::new(socket, credentials, Arc::new(database));

        let peer = match timeout(state.config.handshake_timeout(), transport.handshake()).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectError::Timeout(self.addr.clone())),
        };

        let mut stream = BufReader::new(transport.into_authenticated()?);
        let (seen_as, cookie) = read_greeting(&mut stream).await?;

        Ok(format!(
            "Authenticated {} at {}\n- we are: {}\n- session: {}",
            peer, self.addr, seen_as, cookie
        ))
    }
}

use std::path::PathBuf;

use clap::Args;

use common::certificate::{Certificate, CertificateError};
use common::store::{parse_self_signed, CertificateStorage, StoreError};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Trust {
    /// PEM file holding a foreign domain's self-signed certificate
    pub pem: PathBuf,

    /// Replace a certificate already trusted for that domain
    #[arg(long)]
    pub replace: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DomainTrustError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid certificate: {0}")]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Trust {
    type Error = DomainTrustError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, database) = ctx.open().await?;
        let pem = tokio::fs::read_to_string(&self.pem)
            .await
            .map_err(|e| DomainTrustError::Read(self.pem.clone(), e))?;

        let domain = Certificate::from_pem(&pem)?.subject().domain().to_string();
        let certificate = parse_self_signed(&domain, &pem)?;

        if self.replace {
            let previous = database.replace_self_signed_certificate(&domain, &pem).await?;
            let verb = if previous.is_some() { "Replaced" } else { "Trusted" };
            return Ok(format!("{} {}\n{}", verb, domain, super::describe(&certificate)));
        }

        database.store_self_signed_certificate(&domain, &pem).await?;
        Ok(format!("Trusted {}\n{}", domain, super::describe(&certificate)))
    }
}

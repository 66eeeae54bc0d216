use clap::Args;

use common::store::{CertificateStorage, StoreError};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Show {
    pub domain: String,

    /// Print the certificate as PEM instead of a summary
    #[arg(long)]
    pub pem: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DomainShowError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode certificate: {0}")]
    Encode(#[from] common::certificate::CertificateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Show {
    type Error = DomainShowError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, database) = ctx.open().await?;
        let certificate = database.get_self_signed_certificate(&self.domain).await?;

        if self.pem {
            return Ok(certificate.to_pem()?.trim_end().to_string());
        }
        Ok(super::describe(&certificate))
    }
}

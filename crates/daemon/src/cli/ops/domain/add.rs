use std::path::PathBuf;

use clap::Args;

use common::certificate::{CertificateError, PrivateCertificate};
use common::store::{CertificateStorage, StoreError};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Add {
    /// Domain to create a signing authority for
    pub domain: String,

    /// Import an existing private certificate (PEM) instead of generating one
    #[arg(long)]
    pub import: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DomainAddError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid private certificate: {0}")]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Add {
    type Error = DomainAddError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, database) = ctx.open().await?;

        let imported = match &self.import {
            Some(path) => {
                let pem = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| DomainAddError::Read(path.clone(), e))?;
                Some(PrivateCertificate::from_pem(&pem)?)
            }
            None => None,
        };

        let private = database
            .add_private_certificate(&self.domain, imported)
            .await?;

        Ok(format!(
            "Added domain {}\n{}",
            self.domain,
            super::describe(private.certificate())
        ))
    }
}

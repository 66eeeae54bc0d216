use clap::Args;

use common::store::{CertificateStorage, StoreError};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Rotate {
    /// Domain whose signing authority is replaced with a fresh one
    pub domain: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DomainRotateError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Rotate {
    type Error = DomainRotateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, database) = ctx.open().await?;
        let private = database
            .rotate_private_certificate(&self.domain, None)
            .await?;

        Ok(format!(
            "Rotated domain {}. Certificates issued under the old authority no longer verify.\n{}",
            self.domain,
            super::describe(private.certificate())
        ))
    }
}

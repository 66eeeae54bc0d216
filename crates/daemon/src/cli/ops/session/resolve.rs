use clap::Args;

use common::store::{SessionTokenStorage, StoreError};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Resolve {
    pub cookie: String,

    /// Domain the cookie was issued for
    pub domain: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionResolveError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Resolve {
    type Error = SessionResolveError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, database) = ctx.open().await?;
        let identity = database.id_from_cookie(&self.cookie, &self.domain).await?;
        Ok(identity.to_string())
    }
}

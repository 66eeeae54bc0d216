use clap::Args;

use common::identity::IdentityAddress;
use common::store::{StoreError, UserStore};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Passwd {
    /// Identity as user@domain
    pub identity: IdentityAddress,

    #[arg(long)]
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UserPasswdError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Passwd {
    type Error = UserPasswdError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, database) = ctx.open().await?;
        database.store(&self.identity, &self.password).await?;
        Ok(format!("Stored derived key for {}", self.identity))
    }
}

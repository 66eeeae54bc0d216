use clap::Args;

use common::identity::IdentityAddress;
use common::store::{SessionTokenStorage, StoreError};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Issue {
    /// Identity as user@domain
    pub identity: IdentityAddress,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionIssueError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Issue {
    type Error = SessionIssueError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, database) = ctx.open().await?;
        Ok(database.issue_cookie(&self.identity).await?)
    }
}

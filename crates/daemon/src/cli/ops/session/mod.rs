use clap::{Args, Subcommand};

pub mod issue;
pub mod resolve;

use crate::cli::op::Op;

crate::command_enum! {
    (Issue, issue::Issue),
    (Resolve, resolve::Resolve),
}

// Rename the generated Command to SessionCommand for clarity
pub type SessionCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Session {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[async_trait::async_trait]
impl Op for Session {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

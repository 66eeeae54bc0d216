use clap::{Args, Subcommand};

pub mod issue;
pub mod passwd;

use crate::cli::op::Op;

crate::command_enum! {
    (Passwd, passwd::Passwd),
    (Issue, issue::Issue),
}

// Rename the generated Command to UserCommand for clarity
pub type UserCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct User {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[async_trait::async_trait]
impl Op for User {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

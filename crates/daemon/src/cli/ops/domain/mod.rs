use clap::{Args, Subcommand};

pub mod add;
pub mod rotate;
pub mod show;
pub mod trust;

use common::certificate::Certificate;

use crate::cli::op::Op;

crate::command_enum! {
    (Add, add::Add),
    (Show, show::Show),
    (Trust, trust::Trust),
    (Rotate, rotate::Rotate),
}

// Rename the generated Command to DomainCommand for clarity
pub type DomainCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Domain {
    #[command(subcommand)]
    pub command: DomainCommand,
}

#[async_trait::async_trait]
impl Op for Domain {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

/// One-line summary of a certificate for operator output
pub fn describe(certificate: &Certificate) -> String {
    let fingerprint = certificate
        .fingerprint()
        .map(|f| f.to_hex())
        .unwrap_or_else(|_| "<unencodable>".to_string());
    let expires = time::OffsetDateTime::from_unix_timestamp(certificate.body().not_after)
        .ok()
        .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(|| certificate.body().not_after.to_string());
    format!(
        "subject: {}\nissuer: {}\nserial: {}\nfingerprint: {}\nexpires: {}",
        certificate.subject(),
        certificate.issuer(),
        certificate.serial(),
        fingerprint,
        expires
    )
}

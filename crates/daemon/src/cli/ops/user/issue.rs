use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use common::authority::{AuthorityError, CertificateAuthority, DomainAuthority};
use common::certificate::{CertificateError, CertificateRequest, PrivateCertificate};
use common::crypto::SecretKey;
use common::identity::IdentityAddress;
use common::store::{CertificateStorage, StoreError};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Issue {
    /// Identity as user@domain
    pub identity: IdentityAddress,

    /// Where to write the private certificate (PEM)
    #[arg(long)]
    pub out: PathBuf,

    /// Serial to issue under; defaults to one past the last issued
    #[arg(long)]
    pub serial: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum UserIssueError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Issue {
    type Error = UserIssueError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, database) = ctx.open().await?;
        let domain = database
            .get_private_certificate(self.identity.domain())
            .await?;

        let authority = DomainAuthority::new(Arc::new(database.clone()))
            .with_validity(database.config().certificate_validity);
        let serial = match self.serial {
            Some(serial) => serial,
            None => authority.next_serial(domain.certificate()).await?,
        };

        let key = SecretKey::generate();
        let request = CertificateRequest::new(self.identity.clone(), &key, serial);
        let issued = authority
            .sign_certificate_request(&request, &domain, serial)
            .await?;
        let summary = crate::cli::ops::domain::describe(&issued);

        let private = PrivateCertificate::new(issued, key)?;
        tokio::fs::write(&self.out, private.to_pem()?)
            .await
            .map_err(|e| UserIssueError::Write(self.out.clone(), e))?;

        Ok(format!(
            "Issued certificate for {} to {}\n{}",
            self.identity,
            self.out.display(),
            summary
        ))
    }
}

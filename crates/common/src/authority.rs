//! Signing certificate requests on behalf of a domain
//!
//! A request is checked in a fixed order and the first failure wins:
//!  1. the request's domain must be the domain the signing certificate speaks for
//!  2. the serial must be above every serial issued under that certificate
//!  3. the subject must be a well formed identity
//!
//! Nothing is recorded until all three pass. Signing is Ed25519 and therefore
//! deterministic in its inputs.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::certificate::{
    expiry_after, now_unix, Certificate, CertificateBody, CertificateError, CertificateRequest,
    PrivateCertificate, Subject, CLOCK_SKEW,
};
use crate::identity::IdentityError;
use crate::store::{SerialLedger, StoreError};

/// Default lifetime of issued user certificates
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("the authority of {authority} cannot sign for domain {requested}")]
    DomainMismatch { requested: String, authority: String },
    #[error("serial {suggested} is not greater than last issued serial {last}")]
    SerialReuse { suggested: u64, last: u64 },
    #[error(transparent)]
    MalformedIdentity(#[from] IdentityError),
    #[error("signing certificate unusable: {0}")]
    Certificate(#[from] CertificateError),
    #[error("serial ledger error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AuthorityError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::SerialReuse { suggested, last } => {
                AuthorityError::SerialReuse { suggested, last }
            }
            other => AuthorityError::Store(other),
        }
    }
}

/// Issues certificates under a domain's authority
#[async_trait]
pub trait CertificateAuthority: Send + Sync + Debug {
    /// Sign `request` with `domain_certificate` using serial `suggested_serial`
    ///
    /// The explicit `suggested_serial` is authoritative, the request's own
    /// suggestion is only a hint to the caller.
    ///
    /// Should fail with, in this order of precedence:
    /// * `Err(AuthorityError::DomainMismatch)`
    /// * `Err(AuthorityError::SerialReuse)`
    /// * `Err(AuthorityError::MalformedIdentity)`
    async fn sign_certificate_request(
        &self,
        request: &CertificateRequest,
        domain_certificate: &PrivateCertificate,
        suggested_serial: u64,
    ) -> Result<Certificate, AuthorityError>;
}

/// The certificate authority backed by a [`SerialLedger`]
#[derive(Debug, Clone)]
pub struct DomainAuthority {
    ledger: Arc<dyn SerialLedger>,
    validity: Duration,
}

impl DomainAuthority {
    pub fn new(ledger: Arc<dyn SerialLedger>) -> Self {
        Self {
            ledger,
            validity: DEFAULT_VALIDITY,
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// The smallest serial the ledger would accept under `domain_certificate`
    pub async fn next_serial(&self, domain_certificate: &Certificate) -> Result<u64, AuthorityError> {
        let fingerprint = domain_certificate.fingerprint()?;
        Ok(self
            .ledger
            .last_serial(&fingerprint)
            .await?
            .map(|last| last + 1)
            .unwrap_or(1))
    }
}

#[async_trait]
impl CertificateAuthority for DomainAuthority {
    async fn sign_certificate_request(
        &self,
        request: &CertificateRequest,
        domain_certificate: &PrivateCertificate,
        suggested_serial: u64,
    ) -> Result<Certificate, AuthorityError> {
        let authority = domain_certificate.certificate();

        let domain = match authority.subject() {
            Subject::Domain(domain) if domain == request.subject.domain() => domain.clone(),
            other => {
                return Err(AuthorityError::DomainMismatch {
                    requested: request.subject.domain().to_string(),
                    authority: other.to_string(),
                })
            }
        };

        let fingerprint = authority.fingerprint()?;
        if let Some(last) = self.ledger.last_serial(&fingerprint).await? {
            if suggested_serial <= last {
                return Err(AuthorityError::SerialReuse {
                    suggested: suggested_serial,
                    last,
                });
            }
        }

        request.subject.validate()?;

        let now = now_unix();
        authority.check_validity(now)?;

        // claim is the atomic check, a racing signer loses here
        self.ledger.claim(&fingerprint, suggested_serial).await?;

        let body = CertificateBody {
            subject: Subject::User(request.subject.clone()),
            issuer: domain,
            issuer_fingerprint: Some(fingerprint),
            serial: suggested_serial,
            public_key: request.public_key,
            not_before: now - CLOCK_SKEW.as_secs() as i64,
            not_after: expiry_after(now, self.validity).min(authority.body().not_after),
        };
        let certificate = Certificate::sign(body, domain_certificate.secret_key())?;

        tracing::info!(
            subject = %request.subject,
            serial = suggested_serial,
            "issued certificate"
        );
        Ok(certificate)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;
    use crate::identity::IdentityAddress;
    use crate::store::MemoryStore;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn setup() -> (DomainAuthority, PrivateCertificate) {
        let authority = DomainAuthority::new(Arc::new(MemoryStore::new()));
        let domain = PrivateCertificate::generate_domain("example.org", DAY).unwrap();
        (authority, domain)
    }

    fn request(domain: &str, user: &str) -> CertificateRequest {
        let subject = IdentityAddress::new(domain, user).unwrap();
        CertificateRequest::new(subject, &SecretKey::generate(), 0)
    }

    fn malformed_request() -> CertificateRequest {
        let mut value = serde_json::to_value(request("example.org", "alice")).unwrap();
        value["subject"]["username"] = serde_json::Value::String("bad user".into());
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_issues_verifiable_certificate() {
        let (authority, domain) = setup();
        let request = request("example.org", "alice");
        let cert = authority
            .sign_certificate_request(&request, &domain, 1)
            .await
            .unwrap();

        cert.verify_issued_by(domain.certificate()).unwrap();
        cert.check_validity(now_unix()).unwrap();
        assert_eq!(cert.serial(), 1);
        assert_eq!(*cert.public_key(), request.public_key);
        assert_eq!(cert.subject(), &Subject::User(request.subject.clone()));
        assert!(cert.body().not_after <= domain.certificate().body().not_after);
    }

    #[tokio::test]
    async fn test_domain_mismatch() {
        let (authority, domain) = setup();
        let result = authority
            .sign_certificate_request(&request("evil.org", "alice"), &domain, 1)
            .await;
        assert!(matches!(result, Err(AuthorityError::DomainMismatch { .. })));
    }

    #[tokio::test]
    async fn test_serial_reuse_regardless_of_subject() {
        let (authority, domain) = setup();
        authority
            .sign_certificate_request(&request("example.org", "alice"), &domain, 10)
            .await
            .unwrap();

        for serial in [10, 9, 0] {
            let result = authority
                .sign_certificate_request(&request("example.org", "bob"), &domain, serial)
                .await;
            assert!(matches!(
                result,
                Err(AuthorityError::SerialReuse { last: 10, .. })
            ));
        }
        assert_eq!(authority.next_serial(domain.certificate()).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_mismatch_reported_before_serial_reuse() {
        let (authority, domain) = setup();
        authority
            .sign_certificate_request(&request("example.org", "alice"), &domain, 3)
            .await
            .unwrap();
        let result = authority
            .sign_certificate_request(&request("evil.org", "alice"), &domain, 3)
            .await;
        assert!(matches!(result, Err(AuthorityError::DomainMismatch { .. })));
    }

    #[tokio::test]
    async fn test_malformed_subject_does_not_burn_serial() {
        let (authority, domain) = setup();
        let result = authority
            .sign_certificate_request(&malformed_request(), &domain, 5)
            .await;
        assert!(matches!(result, Err(AuthorityError::MalformedIdentity(_))));

        authority
            .sign_certificate_request(&request("example.org", "alice"), &domain, 5)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_serial_checked_before_subject() {
        let (authority, domain) = setup();
        authority
            .sign_certificate_request(&request("example.org", "alice"), &domain, 5)
            .await
            .unwrap();
        let result = authority
            .sign_certificate_request(&malformed_request(), &domain, 5)
            .await;
        assert!(matches!(result, Err(AuthorityError::SerialReuse { .. })));
    }

    #[tokio::test]
    async fn test_serials_are_per_domain_certificate() {
        let (authority, domain) = setup();
        let other = PrivateCertificate::generate_domain("other.org", DAY).unwrap();
        authority
            .sign_certificate_request(&request("example.org", "alice"), &domain, 7)
            .await
            .unwrap();
        authority
            .sign_certificate_request(&request("other.org", "alice"), &other, 7)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_user_certificate_cannot_sign() {
        let (authority, domain) = setup();
        let user_key = SecretKey::generate();
        let user_cert = authority
            .sign_certificate_request(
                &CertificateRequest::new(
                    IdentityAddress::new("example.org", "alice").unwrap(),
                    &user_key,
                    0,
                ),
                &domain,
                1,
            )
            .await
            .unwrap();
        let user_private = PrivateCertificate::new(user_cert, user_key).unwrap();

        let result = authority
            .sign_certificate_request(&request("example.org", "bob"), &user_private, 2)
            .await;
        assert!(matches!(result, Err(AuthorityError::DomainMismatch { .. })));
    }
}

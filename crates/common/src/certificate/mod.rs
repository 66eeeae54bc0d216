//! Certificates binding public keys to domains and identities
//!
//! Two kinds exist. A *domain certificate* names a whole domain and is
//! self-signed; it is the root every identity in that domain is checked
//! against. A *user certificate* names a single [`IdentityAddress`] and is
//! signed by its domain's certificate.
//!
//! The body is `bincode` encoded for signing and storage and travels in a PEM
//! block tagged `Q2Q CERTIFICATE`.

mod private;
mod request;

use std::fmt::{self, Display};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, SecretKey, Signature};
use crate::identity::{validate_domain, IdentityAddress, IdentityError};

pub use private::PrivateCertificate;
pub use request::CertificateRequest;

/// PEM tag used for serialized certificates
pub const CERTIFICATE_PEM_TAG: &str = "Q2Q CERTIFICATE";
/// Size of a certificate fingerprint (BLAKE3) in bytes
pub const FINGERPRINT_SIZE: usize = 32;
/// Slack applied to `not_before` so freshly issued certificates survive small clock drift
pub const CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Current wall clock time as unix seconds
pub fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// `now + lifetime` in unix seconds, pinned at `i64::MAX` instead of overflowing
pub fn expiry_after(now: i64, lifetime: Duration) -> i64 {
    i64::try_from(lifetime.as_secs())
        .map(|secs| now.saturating_add(secs))
        .unwrap_or(i64::MAX)
}

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("certificate encoding error: {0}")]
    Encoding(String),
    #[error("certificate PEM error: {0}")]
    Pem(String),
    #[error("certificate signature does not verify")]
    BadSignature,
    #[error("certificate expired at {0}")]
    Expired(i64),
    #[error("certificate not valid before {0}")]
    NotYetValid(i64),
    #[error("certificate for {0} is not self-signed")]
    NotSelfSigned(Subject),
    #[error("certificate issued by {found}, expected {expected}")]
    IssuerMismatch { expected: String, found: String },
    #[error("private key does not match certificate public key")]
    KeyMismatch,
    #[error("certificate subject is malformed: {0}")]
    MalformedSubject(#[from] IdentityError),
}

/// BLAKE3 digest of an encoded certificate
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, CertificateError> {
        let mut buff = [0; FINGERPRINT_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|e| CertificateError::Encoding(format!("fingerprint hex: {}", e)))?;
        Ok(Self(buff))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Who a certificate speaks for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// The domain authority itself
    Domain(String),
    /// A single user within a domain
    User(IdentityAddress),
}

impl Subject {
    pub fn domain(&self) -> &str {
        match self {
            Subject::Domain(domain) => domain,
            Subject::User(identity) => identity.domain(),
        }
    }

    pub fn validate(&self) -> Result<(), IdentityError> {
        match self {
            Subject::Domain(domain) => validate_domain(domain),
            Subject::User(identity) => identity.validate(),
        }
    }

    /// Whether a holder of this subject's key may claim `identity`.
    ///
    /// A domain speaks for every user in it, a user only for itself.
    pub fn covers(&self, identity: &IdentityAddress) -> bool {
        match self {
            Subject::Domain(domain) => domain == identity.domain(),
            Subject::User(user) => user == identity,
        }
    }
}

impl Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Domain(domain) => f.write_str(domain),
            Subject::User(identity) => Display::fmt(identity, f),
        }
    }
}

/// The signed portion of a certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBody {
    pub subject: Subject,
    /// Domain whose authority signed this certificate
    pub issuer: String,
    /// Fingerprint of the issuing domain certificate, `None` when self-signed
    pub issuer_fingerprint: Option<Fingerprint>,
    pub serial: u64,
    pub public_key: PublicKey,
    /// Validity window, unix seconds
    pub not_before: i64,
    pub not_after: i64,
}

impl CertificateBody {
    fn to_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        bincode::serialize(self).map_err(|e| CertificateError::Encoding(e.to_string()))
    }
}

/// An issued, immutable certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    body: CertificateBody,
    signature: Signature,
}

impl Certificate {
    /// Sign `body` with `signer`, producing a certificate
    pub fn sign(body: CertificateBody, signer: &SecretKey) -> Result<Self, CertificateError> {
        body.subject.validate()?;
        let signature = signer.sign(&body.to_bytes()?);
        Ok(Self { body, signature })
    }

    /// Build a self-signed domain certificate for `secret`'s public key
    pub fn self_signed(
        domain: &str,
        secret: &SecretKey,
        serial: u64,
        validity: Duration,
    ) -> Result<Self, CertificateError> {
        let now = now_unix();
        let body = CertificateBody {
            subject: Subject::Domain(domain.to_string()),
            issuer: domain.to_string(),
            issuer_fingerprint: None,
            serial,
            public_key: secret.public(),
            not_before: now - CLOCK_SKEW.as_secs() as i64,
            not_after: expiry_after(now, validity),
        };
        Self::sign(body, secret)
    }

    pub fn body(&self) -> &CertificateBody {
        &self.body
    }

    pub fn subject(&self) -> &Subject {
        &self.body.subject
    }

    pub fn issuer(&self) -> &str {
        &self.body.issuer
    }

    pub fn serial(&self) -> u64 {
        self.body.serial
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.body.public_key
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn is_self_signed(&self) -> bool {
        self.body.issuer_fingerprint.is_none()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        bincode::serialize(self).map_err(|e| CertificateError::Encoding(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CertificateError> {
        let certificate: Self =
            bincode::deserialize(bytes).map_err(|e| CertificateError::Encoding(e.to_string()))?;
        certificate.body.subject.validate()?;
        validate_domain(&certificate.body.issuer)?;
        Ok(certificate)
    }

    pub fn fingerprint(&self) -> Result<Fingerprint, CertificateError> {
        Ok(Fingerprint(*blake3::hash(&self.to_bytes()?).as_bytes()))
    }

    pub fn to_pem_block(&self) -> Result<pem::Pem, CertificateError> {
        Ok(pem::Pem::new(CERTIFICATE_PEM_TAG, self.to_bytes()?))
    }

    pub fn to_pem(&self) -> Result<String, CertificateError> {
        Ok(pem::encode(&self.to_pem_block()?))
    }

    pub fn from_pem_block(block: &pem::Pem) -> Result<Self, CertificateError> {
        if block.tag() != CERTIFICATE_PEM_TAG {
            return Err(CertificateError::Pem(format!(
                "invalid PEM tag, expected {}, got {}",
                CERTIFICATE_PEM_TAG,
                block.tag()
            )));
        }
        Self::from_bytes(block.contents())
    }

    pub fn from_pem(pem_str: &str) -> Result<Self, CertificateError> {
        let block = pem::parse(pem_str).map_err(|e| CertificateError::Pem(e.to_string()))?;
        Self::from_pem_block(&block)
    }

    /// Check the signature against `key`
    pub fn verify_signature(&self, key: &PublicKey) -> Result<(), CertificateError> {
        key.verify(&self.body.to_bytes()?, &self.signature)
            .map_err(|_| CertificateError::BadSignature)
    }

    /// Check that this is a correctly self-signed domain certificate
    pub fn verify_self_signed(&self) -> Result<(), CertificateError> {
        match &self.body.subject {
            Subject::Domain(domain)
                if self.body.issuer_fingerprint.is_none() && *domain == self.body.issuer => {}
            _ => return Err(CertificateError::NotSelfSigned(self.body.subject.clone())),
        }
        self.verify_signature(&self.body.public_key)
    }

    /// Check that `authority` (a domain certificate) issued this certificate
    pub fn verify_issued_by(&self, authority: &Certificate) -> Result<(), CertificateError> {
        let authority_domain = match authority.subject() {
            Subject::Domain(domain) => domain,
            other => {
                return Err(CertificateError::IssuerMismatch {
                    expected: self.body.issuer.clone(),
                    found: other.to_string(),
                })
            }
        };
        if *authority_domain != self.body.issuer {
            return Err(CertificateError::IssuerMismatch {
                expected: self.body.issuer.clone(),
                found: authority_domain.clone(),
            });
        }
        let authority_fingerprint = authority.fingerprint()?;
        if self.body.issuer_fingerprint != Some(authority_fingerprint) {
            return Err(CertificateError::IssuerMismatch {
                expected: authority_fingerprint.to_hex(),
                found: self
                    .body
                    .issuer_fingerprint
                    .map(|f| f.to_hex())
                    .unwrap_or_else(|| "self".to_string()),
            });
        }
        self.verify_signature(authority.public_key())
    }

    /// Check the validity window against `now` (unix seconds)
    pub fn check_validity(&self, now: i64) -> Result<(), CertificateError> {
        if now < self.body.not_before {
            return Err(CertificateError::NotYetValid(self.body.not_before));
        }
        if now > self.body.not_after {
            return Err(CertificateError::Expired(self.body.not_after));
        }
        Ok(())
    }
}

//! Persistent state behind the authority and the transport
//!
//! Each concern gets its own trait in [`provider`] so backends can be mixed
//! and injected: the user store (derived keys), the certificate store, the
//! session token store and the serial ledger. [`memory::MemoryStore`]
//! implements all of them in process; the daemon implements them on sqlite.

pub mod memory;
pub mod provider;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::certificate::{Certificate, CertificateError, PrivateCertificate, Subject};
use crate::crypto::{KdfError, KdfParams};
use crate::identity::{validate_domain, IdentityAddress, IdentityError};

pub use memory::MemoryStore;
pub use provider::{CertificateStorage, SerialLedger, SessionTokenStorage, UserStore};

/// Size of a session cookie in random bytes, hex encoded on the wire
pub const COOKIE_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or failed mid-operation. The only
    /// class of error worth retrying.
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
    #[error(transparent)]
    MalformedIdentity(#[from] IdentityError),
    #[error("unknown identity: {0}")]
    UnknownIdentity(IdentityAddress),
    #[error("no certificate found for domain {0}")]
    CertificateNotFound(String),
    #[error("a certificate already exists for domain {0}")]
    CertificateExists(String),
    #[error("invalid certificate: {0}")]
    InvalidCertificate(#[from] CertificateError),
    #[error(
        "domain {0} is served by a local private certificate; \
         use rotate_private_certificate to replace its public half"
    )]
    LocallyOwned(String),
    #[error("unknown or expired session")]
    UnknownSession,
    #[error("serial {suggested} is not greater than last issued serial {last}")]
    SerialReuse { suggested: u64, last: u64 },
    #[error(transparent)]
    KeyDerivation(#[from] KdfError),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// What `store_self_signed_certificate` does when the domain already has one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    /// Fail with [`StoreError::CertificateExists`]; rotation goes through
    /// `replace_self_signed_certificate`
    #[default]
    Reject,
    /// Atomically swap in the new certificate
    Replace,
}

/// Knobs shared by every store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub kdf: KdfParams,
    pub session_ttl: Duration,
    pub replacement_policy: ReplacementPolicy,
    /// Lifetime of domain certificates generated by `add_private_certificate`
    pub certificate_validity: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            replacement_policy: ReplacementPolicy::default(),
            certificate_validity: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

/// Parse and check a self-signed certificate offered for `domain`.
pub fn parse_self_signed(domain: &str, certificate: &str) -> Result<Certificate, StoreError> {
    validate_domain(domain)?;
    let certificate = Certificate::from_pem(certificate)?;
    check_domain_authority(domain, &certificate)?;
    Ok(certificate)
}

/// Check that `certificate` is the self-signed authority of `domain`.
pub fn check_domain_authority(domain: &str, certificate: &Certificate) -> Result<(), StoreError> {
    match certificate.subject() {
        Subject::Domain(subject) if subject == domain => {}
        other => {
            return Err(CertificateError::IssuerMismatch {
                expected: domain.to_string(),
                found: other.to_string(),
            }
            .into())
        }
    }
    certificate.verify_self_signed()?;
    Ok(())
}

/// Resolve what `add_private_certificate`/`rotate_private_certificate` should store.
///
/// Supplied certificates are taken as-is once they check out as the domain's
/// authority; otherwise a fresh one is generated.
pub fn prepare_private_certificate(
    domain: &str,
    supplied: Option<PrivateCertificate>,
    validity: Duration,
) -> Result<PrivateCertificate, StoreError> {
    validate_domain(domain)?;
    match supplied {
        Some(private) => {
            check_domain_authority(domain, private.certificate())?;
            Ok(private)
        }
        None => Ok(PrivateCertificate::generate_domain(domain, validity)?),
    }
}

/// Mint a fresh random session cookie
pub fn new_cookie() -> String {
    let mut bytes = [0u8; COOKIE_SIZE];
    getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
    hex::encode(bytes)
}

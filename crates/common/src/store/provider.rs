use std::fmt::Debug;

use async_trait::async_trait;

use crate::certificate::{Certificate, Fingerprint, PrivateCertificate};
use crate::crypto::DerivedKey;
use crate::identity::IdentityAddress;

use super::StoreError;

/// Maps identities to keys derived from their passwords
///
/// Only the derived key is ever persisted. A store computes keys itself with
/// its configured [`KdfParams`](crate::crypto::KdfParams); nothing else
/// derives or caches them.
#[async_trait]
pub trait UserStore: Send + Sync + Debug {
    /// Derive a key from `password` and persist it for `identity`
    ///
    /// Overwrites any earlier key for the identity (password rotation). A
    /// concurrent [`UserStore::key`] sees either the old key or the new one.
    ///
    /// Should fail with:
    /// * `Err(StoreError::MalformedIdentity)` - the identity is not well formed
    /// * `Err(StoreError::Unavailable)` - the write did not make it to storage
    async fn store(&self, identity: &IdentityAddress, password: &str) -> Result<(), StoreError>;

    /// Retrieve the key derived for `identity`
    ///
    /// # Returns
    /// * `Ok(DerivedKey)` - the stored key
    /// * `Err(StoreError::UnknownIdentity)` - nothing stored for this identity
    async fn key(&self, identity: &IdentityAddress) -> Result<DerivedKey, StoreError>;
}

/// Per-domain store of the public self-signed certificate and the private
/// (certificate + key) authority
#[async_trait]
pub trait CertificateStorage: Send + Sync + Debug {
    /// Fetch the domain's canonical self-signed certificate. Never issues one.
    async fn get_self_signed_certificate(&self, domain: &str) -> Result<Certificate, StoreError>;

    /// Persist `certificate` (PEM) as the domain's self-signed certificate
    ///
    /// Under the default [`ReplacementPolicy::Reject`](super::ReplacementPolicy)
    /// an existing, different certificate makes this fail with
    /// `Err(StoreError::CertificateExists)` and the old one stays in place.
    /// Storing the identical certificate again is a no-op.
    async fn store_self_signed_certificate(
        &self,
        domain: &str,
        certificate: &str,
    ) -> Result<(), StoreError>;

    /// Atomically swap the domain's self-signed certificate, returning the old one
    async fn replace_self_signed_certificate(
        &self,
        domain: &str,
        certificate: &str,
    ) -> Result<Option<Certificate>, StoreError>;

    /// Fetch the domain's private certificate
    ///
    /// # Returns
    /// * `Err(StoreError::CertificateNotFound)` - the domain has none
    async fn get_private_certificate(&self, domain: &str)
        -> Result<PrivateCertificate, StoreError>;

    /// Bootstrap a domain's signing authority
    ///
    /// Stores `existing` as-is, or generates a fresh key pair and self-signed
    /// certificate when `None`. The public half becomes the domain's
    /// self-signed certificate if it has none yet.
    ///
    /// Never overwrites: fails with `Err(StoreError::CertificateExists)` if the
    /// domain already has a private certificate, or a self-signed certificate
    /// that does not match.
    async fn add_private_certificate(
        &self,
        domain: &str,
        existing: Option<PrivateCertificate>,
    ) -> Result<PrivateCertificate, StoreError>;

    /// Replace a domain's private certificate and its public half together
    ///
    /// # Returns
    /// * `Err(StoreError::CertificateNotFound)` - nothing to rotate
    async fn rotate_private_certificate(
        &self,
        domain: &str,
        replacement: Option<PrivateCertificate>,
    ) -> Result<PrivateCertificate, StoreError>;
}

/// Resolves domain-scoped session cookies to identities
#[async_trait]
pub trait SessionTokenStorage: Send + Sync + Debug {
    /// Look up the identity behind `cookie` within `domain`
    ///
    /// A cookie only ever resolves in the domain that issued it.
    ///
    /// # Returns
    /// * `Err(StoreError::UnknownSession)` - no such `(cookie, domain)`, or it expired
    async fn id_from_cookie(&self, cookie: &str, domain: &str)
        -> Result<IdentityAddress, StoreError>;

    /// Mint a cookie for `identity`, scoped to the identity's domain
    async fn issue_cookie(&self, identity: &IdentityAddress) -> Result<String, StoreError>;

    /// Drop a cookie, returning whether it existed
    async fn revoke_cookie(&self, cookie: &str, domain: &str) -> Result<bool, StoreError>;
}

/// Highest serial issued under each domain certificate
#[async_trait]
pub trait SerialLedger: Send + Sync + Debug {
    async fn last_serial(&self, issuer: &Fingerprint) -> Result<Option<u64>, StoreError>;

    /// Record `serial` as issued under `issuer`
    ///
    /// Atomic check-and-set: fails with `Err(StoreError::SerialReuse)` unless
    /// `serial` is strictly greater than every serial recorded before.
    async fn claim(&self, issuer: &Fingerprint, serial: u64) -> Result<(), StoreError>;
}

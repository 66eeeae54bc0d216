use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, SecretKey};
use crate::identity::IdentityAddress;

/// A request for a domain to certify a user's public key
///
/// Consumed once by a [`CertificateAuthority`](crate::authority::CertificateAuthority).
/// The subject is checked again by the authority since requests may arrive
/// over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub subject: IdentityAddress,
    pub public_key: PublicKey,
    /// Serial the requester would like, the authority decides
    pub suggested_serial: u64,
}

impl CertificateRequest {
    pub fn new(subject: IdentityAddress, secret: &SecretKey, suggested_serial: u64) -> Self {
        Self {
            subject,
            public_key: secret.public(),
            suggested_serial,
        }
    }
}

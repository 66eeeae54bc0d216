use serde::{Deserialize, Serialize};

use crate::certificate::{Certificate, Fingerprint};
use crate::crypto::Signature;
use crate::identity::IdentityAddress;

/// Version spoken by this implementation of the handshake
pub const PROTOCOL_VERSION: u16 = 1;
/// Size of the per-connection random challenge
pub const NONCE_SIZE: usize = 32;

const TRANSCRIPT_CONTEXT: &str = "q2q handshake transcript v1";

/// Handshake messages, each side sends exactly one of each in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Opens the handshake
    Hello(Hello),
    /// Proves possession of the key behind the presented certificate
    Proof(Proof),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello(_) => "hello",
            Message::Proof(_) => "proof",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub version: u16,
    /// Identity the sender claims
    pub identity: IdentityAddress,
    /// Domain or user certificate covering `identity`
    pub certificate: Certificate,
    pub nonce: [u8; NONCE_SIZE],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub signature: Signature,
}

/// The bytes a side signs to prove key possession
///
/// Binds the signer's claimed identity, the certificate it presented and both
/// challenges, signer's first.
pub fn transcript(
    signer: &IdentityAddress,
    certificate: &Fingerprint,
    signer_nonce: &[u8; NONCE_SIZE],
    verifier_nonce: &[u8; NONCE_SIZE],
) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(TRANSCRIPT_CONTEXT);
    let identity = signer.to_string();
    hasher.update(&(identity.len() as u64).to_be_bytes());
    hasher.update(identity.as_bytes());
    hasher.update(certificate.as_bytes());
    hasher.update(signer_nonce);
    hasher.update(verifier_nonce);
    *hasher.finalize().as_bytes()
}

pub fn new_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce).expect("failed to generate random bytes");
    nonce
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_transcript_is_directional() {
        let alice = IdentityAddress::new("example.org", "alice").unwrap();
        let fingerprint = Fingerprint::from_hex(&"01".repeat(32)).unwrap();
        let a = new_nonce();
        let b = new_nonce();
        assert_eq!(
            transcript(&alice, &fingerprint, &a, &b),
            transcript(&alice, &fingerprint, &a, &b)
        );
        assert_ne!(
            transcript(&alice, &fingerprint, &a, &b),
            transcript(&alice, &fingerprint, &b, &a)
        );
    }
}

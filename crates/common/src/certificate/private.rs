use std::time::Duration;

use crate::crypto::{SecretKey, Signature};
use crate::identity::validate_domain;

use super::{Certificate, CertificateError, CERTIFICATE_PEM_TAG};

/// A certificate together with the private key for its public key
///
/// A domain's main private certificate is its signing authority. Encoded as
/// two PEM blocks, the certificate first and the key second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateCertificate {
    certificate: Certificate,
    secret: SecretKey,
}

impl PrivateCertificate {
    pub fn new(certificate: Certificate, secret: SecretKey) -> Result<Self, CertificateError> {
        if secret.public() != *certificate.public_key() {
            return Err(CertificateError::KeyMismatch);
        }
        Ok(Self {
            certificate,
            secret,
        })
    }

    /// Fresh key pair plus a self-signed certificate naming `domain`
    pub fn generate_domain(domain: &str, validity: Duration) -> Result<Self, CertificateError> {
        validate_domain(domain)?;
        let secret = SecretKey::generate();
        let certificate = Certificate::self_signed(domain, &secret, 0, validity)?;
        Ok(Self {
            certificate,
            secret,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.secret.sign(msg)
    }

    pub fn to_pem(&self) -> Result<String, CertificateError> {
        Ok(pem::encode_many(&[
            self.certificate.to_pem_block()?,
            self.secret.to_pem_block(),
        ]))
    }

    pub fn from_pem(pem_str: &str) -> Result<Self, CertificateError> {
        let blocks = pem::parse_many(pem_str).map_err(|e| CertificateError::Pem(e.to_string()))?;
        let certificate = blocks
            .iter()
            .find(|block| block.tag() == CERTIFICATE_PEM_TAG)
            .ok_or_else(|| CertificateError::Pem("missing certificate block".to_string()))
            .and_then(Certificate::from_pem_block)?;
        let secret = blocks
            .iter()
            .find(|block| block.tag() == crate::crypto::PRIVATE_KEY_PEM_TAG)
            .ok_or_else(|| CertificateError::Pem("missing private key block".to_string()))
            .and_then(|block| {
                SecretKey::from_pem_block(block).map_err(|e| CertificateError::Pem(e.to_string()))
            })?;
        Self::new(certificate, secret)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_generate_domain_is_self_signed() {
        let private = PrivateCertificate::generate_domain("example.org", DAY).unwrap();
        private.certificate().verify_self_signed().unwrap();
        assert_eq!(
            private.secret_key().public(),
            *private.certificate().public_key()
        );
    }

    #[test]
    fn test_pem_round_trip() {
        let private = PrivateCertificate::generate_domain("example.org", DAY).unwrap();
        let pem = private.to_pem().unwrap();
        assert_eq!(PrivateCertificate::from_pem(&pem).unwrap(), private);
    }

    #[test]
    fn test_rejects_mismatched_key() {
        let private = PrivateCertificate::generate_domain("example.org", DAY).unwrap();
        let result = PrivateCertificate::new(private.certificate().clone(), SecretKey::generate());
        assert!(matches!(result, Err(CertificateError::KeyMismatch)));
    }

    #[test]
    fn test_pem_without_key_is_rejected() {
        let private = PrivateCertificate::generate_domain("example.org", DAY).unwrap();
        let only_cert = private.certificate().to_pem().unwrap();
        assert!(PrivateCertificate::from_pem(&only_cert).is_err());
    }
}

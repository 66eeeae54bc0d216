//! Password key derivation
//!
//! Derived keys come from Argon2id. The salt is not random: it is derived from
//! the identity under a versioned context, so the same identity and password
//! always yield the same key and nothing but the key needs to be persisted.

use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::identity::IdentityAddress;

/// Bumped whenever the derivation changes in a way that alters its output
pub const KDF_VERSION: u8 = 1;
/// Length of every derived key in bytes
pub const DERIVED_KEY_SIZE: usize = 32;
/// Salt length bounds, argon2 refuses anything shorter than 8 bytes
pub const MIN_SALT_LENGTH: usize = 8;
pub const MAX_SALT_LENGTH: usize = 32;

const SALT_CONTEXT: &str = "q2q user-store salt v1";

#[derive(Debug, thiserror::Error)]
pub enum KdfError {
    #[error("invalid key derivation parameters: {0}")]
    InvalidParams(String),
    #[error("key derivation failed: {0}")]
    Derivation(String),
    #[error("key derivation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Tunables for the key derivation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Argon2 time cost
    pub iterations: u32,
    /// Argon2 memory cost in KiB
    pub memory_kib: u32,
    /// Number of salt bytes taken from the identity-derived salt
    pub salt_length: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: 3,
            memory_kib: Params::DEFAULT_M_COST,
            salt_length: 16,
        }
    }
}

impl KdfParams {
    pub fn new(iterations: u32, memory_kib: u32, salt_length: usize) -> Result<Self, KdfError> {
        let params = Self {
            iterations,
            memory_kib,
            salt_length,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), KdfError> {
        if !(MIN_SALT_LENGTH..=MAX_SALT_LENGTH).contains(&self.salt_length) {
            return Err(KdfError::InvalidParams(format!(
                "salt length must be between {} and {}, got {}",
                MIN_SALT_LENGTH, MAX_SALT_LENGTH, self.salt_length
            )));
        }
        self.argon2_params().map(|_| ())
    }

    fn argon2_params(&self) -> Result<Params, KdfError> {
        Params::new(
            self.memory_kib,
            self.iterations,
            1,
            Some(DERIVED_KEY_SIZE),
        )
        .map_err(|e| KdfError::InvalidParams(e.to_string()))
    }

    fn salt(&self, identity: &IdentityAddress) -> Vec<u8> {
        let mut material = Vec::with_capacity(identity.domain().len() + identity.username().len() + 2);
        material.push(KDF_VERSION);
        material.extend_from_slice(identity.domain().as_bytes());
        material.push(0);
        material.extend_from_slice(identity.username().as_bytes());
        blake3::derive_key(SALT_CONTEXT, &material)[..self.salt_length].to_vec()
    }

    /// Run the derivation on the current thread
    pub fn derive_blocking(
        &self,
        identity: &IdentityAddress,
        password: &str,
    ) -> Result<DerivedKey, KdfError> {
        // fields are public, so params may not have come through `new`
        self.validate()?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.argon2_params()?);
        let mut output = [0u8; DERIVED_KEY_SIZE];
        argon2
            .hash_password_into(password.as_bytes(), &self.salt(identity), &mut output)
            .map_err(|e| KdfError::Derivation(e.to_string()))?;
        Ok(DerivedKey(output.to_vec()))
    }

    /// Run the derivation on the blocking pool
    pub async fn derive(
        &self,
        identity: &IdentityAddress,
        password: &str,
    ) -> Result<DerivedKey, KdfError> {
        let params = *self;
        let identity = identity.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || params.derive_blocking(&identity, &password)).await?
    }
}

/// Secret produced from a password, never reversible to it
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey(Vec<u8>);

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

impl DerivedKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::new(1, 64, 16).unwrap()
    }

    fn alice() -> IdentityAddress {
        IdentityAddress::new("example.org", "alice").unwrap()
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = fast().derive_blocking(&alice(), "hunter2").unwrap();
        let b = fast().derive_blocking(&alice(), "hunter2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes().len(), DERIVED_KEY_SIZE);
        assert_ne!(a.as_bytes(), b"hunter2");
    }

    #[test]
    fn test_identity_and_password_both_matter() {
        let bob = IdentityAddress::new("example.org", "bob").unwrap();
        let base = fast().derive_blocking(&alice(), "hunter2").unwrap();
        assert_ne!(base, fast().derive_blocking(&bob, "hunter2").unwrap());
        assert_ne!(base, fast().derive_blocking(&alice(), "hunter3").unwrap());
    }

    #[test]
    fn test_params_change_the_key() {
        let a = fast().derive_blocking(&alice(), "pw").unwrap();
        let b = KdfParams::new(2, 64, 16)
            .unwrap()
            .derive_blocking(&alice(), "pw")
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_bad_salt_length() {
        assert!(KdfParams::new(1, 64, 4).is_err());
        assert!(KdfParams::new(1, 64, 33).is_err());
    }

    #[tokio::test]
    async fn test_unvalidated_params_error_instead_of_panicking() {
        let params = KdfParams {
            salt_length: 64,
            ..KdfParams::default()
        };
        assert!(matches!(
            params.derive_blocking(&alice(), "pw"),
            Err(KdfError::InvalidParams(_))
        ));
        assert!(matches!(
            params.derive(&alice(), "pw").await,
            Err(KdfError::InvalidParams(_))
        ));

        let params = KdfParams {
            salt_length: 0,
            ..fast()
        };
        assert!(matches!(
            params.derive_blocking(&alice(), "pw"),
            Err(KdfError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = fast().derive_blocking(&alice(), "pw").unwrap();
        assert_eq!(format!("{:?}", key), "DerivedKey(..)");
    }

    #[tokio::test]
    async fn test_async_matches_blocking() {
        let params = fast();
        let a = params.derive(&alice(), "pw").await.unwrap();
        let b = params.derive_blocking(&alice(), "pw").unwrap();
        assert_eq!(a, b);
    }
}

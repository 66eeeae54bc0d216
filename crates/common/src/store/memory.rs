use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::provider::{CertificateStorage, SerialLedger, SessionTokenStorage, UserStore};
use super::{
    new_cookie, parse_self_signed, prepare_private_certificate, ReplacementPolicy, StoreConfig,
    StoreError,
};
use crate::certificate::{expiry_after, now_unix, Certificate, Fingerprint, PrivateCertificate};
use crate::crypto::DerivedKey;
use crate::identity::{validate_domain, IdentityAddress};

/// In-memory implementation of every store trait using HashMaps
#[derive(Debug, Clone)]
pub struct MemoryStore {
    config: StoreConfig,
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    /// identity -> derived key
    keys: HashMap<IdentityAddress, DerivedKey>,
    /// domain -> certificate record
    domains: HashMap<String, DomainRecord>,
    /// (cookie, domain) -> session
    sessions: HashMap<(String, String), SessionRecord>,
    /// issuer fingerprint -> highest serial issued
    serials: HashMap<Fingerprint, u64>,
}

#[derive(Debug, Default, Clone)]
struct DomainRecord {
    self_signed: Option<Certificate>,
    private: Option<PrivateCertificate>,
}

#[derive(Debug, Clone)]
struct SessionRecord {
    identity: IdentityAddress,
    expires_at: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            inner: Arc::new(RwLock::new(MemoryStoreInner::default())),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn store(&self, identity: &IdentityAddress, password: &str) -> Result<(), StoreError> {
        identity.validate()?;
        // derive before taking the lock, readers only ever see whole keys
        let key = self.config.kdf.derive(identity, password).await?;
        self.inner.write().keys.insert(identity.clone(), key);
        tracing::debug!("stored derived key for {}", identity);
        Ok(())
    }

    async fn key(&self, identity: &IdentityAddress) -> Result<DerivedKey, StoreError> {
        identity.validate()?;
        self.inner
            .read()
            .keys
            .get(identity)
            .cloned()
            .ok_or_else(|| StoreError::UnknownIdentity(identity.clone()))
    }
}

#[async_trait]
impl CertificateStorage for MemoryStore {
    async fn get_self_signed_certificate(&self, domain: &str) -> Result<Certificate, StoreError> {
        validate_domain(domain)?;
        self.inner
            .read()
            .domains
            .get(domain)
            .and_then(|record| record.self_signed.clone())
            .ok_or_else(|| StoreError::CertificateNotFound(domain.to_string()))
    }

    async fn store_self_signed_certificate(
        &self,
        domain: &str,
        certificate: &str,
    ) -> Result<(), StoreError> {
        let certificate = parse_self_signed(domain, certificate)?;
        let mut inner = self.inner.write();
        let record = inner.domains.entry(domain.to_string()).or_default();
        let unchanged = record.self_signed.as_ref().map(|existing| *existing == certificate);
        match unchanged {
            Some(true) => Ok(()),
            Some(false) if self.config.replacement_policy == ReplacementPolicy::Reject => {
                Err(StoreError::CertificateExists(domain.to_string()))
            }
            Some(false) if record.private.is_some() => {
                Err(StoreError::LocallyOwned(domain.to_string()))
            }
            _ => {
                record.self_signed = Some(certificate);
                tracing::info!("stored self-signed certificate for {}", domain);
                Ok(())
            }
        }
    }

    async fn replace_self_signed_certificate(
        &self,
        domain: &str,
        certificate: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        let certificate = parse_self_signed(domain, certificate)?;
        let mut inner = self.inner.write();
        let record = inner.domains.entry(domain.to_string()).or_default();
        if let Some(private) = &record.private {
            if private.certificate() != &certificate {
                return Err(StoreError::LocallyOwned(domain.to_string()));
            }
        }
        tracing::info!("replacing self-signed certificate for {}", domain);
        Ok(record.self_signed.replace(certificate))
    }

    async fn get_private_certificate(
        &self,
        domain: &str,
    ) -> Result<PrivateCertificate, StoreError> {
        validate_domain(domain)?;
        self.inner
            .read()
            .domains
            .get(domain)
            .and_then(|record| record.private.clone())
            .ok_or_else(|| StoreError::CertificateNotFound(domain.to_string()))
    }

    async fn add_private_certificate(
        &self,
        domain: &str,
        existing: Option<PrivateCertificate>,
    ) -> Result<PrivateCertificate, StoreError> {
        let private =
            prepare_private_certificate(domain, existing, self.config.certificate_validity)?;

        let mut inner = self.inner.write();
        let record = inner.domains.entry(domain.to_string()).or_default();
        if record.private.is_some() {
            return Err(StoreError::CertificateExists(domain.to_string()));
        }
        match record
            .self_signed
            .as_ref()
            .map(|public| public == private.certificate())
        {
            Some(false) => return Err(StoreError::CertificateExists(domain.to_string())),
            Some(true) => {}
            None => record.self_signed = Some(private.certificate().clone()),
        }
        record.private = Some(private.clone());
        tracing::info!("added private certificate for {}", domain);
        Ok(private)
    }

    async fn rotate_private_certificate(
        &self,
        domain: &str,
        replacement: Option<PrivateCertificate>,
    ) -> Result<PrivateCertificate, StoreError> {
        let private =
            prepare_private_certificate(domain, replacement, self.config.certificate_validity)?;

        let mut inner = self.inner.write();
        let record = inner
            .domains
            .get_mut(domain)
            .filter(|record| record.private.is_some())
            .ok_or_else(|| StoreError::CertificateNotFound(domain.to_string()))?;
        record.self_signed = Some(private.certificate().clone());
        record.private = Some(private.clone());
        tracing::info!("rotated private certificate for {}", domain);
        Ok(private)
    }
}

#[async_trait]
impl SessionTokenStorage for MemoryStore {
    async fn id_from_cookie(
        &self,
        cookie: &str,
        domain: &str,
    ) -> Result<IdentityAddress, StoreError> {
        validate_domain(domain)?;
        let key = (cookie.to_string(), domain.to_string());
        let mut inner = self.inner.write();
        let expired = match inner.sessions.get(&key) {
            Some(session) if session.expires_at > now_unix() => {
                debug_assert_eq!(session.identity.domain(), domain);
                return Ok(session.identity.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.sessions.remove(&key);
        }
        Err(StoreError::UnknownSession)
    }

    async fn issue_cookie(&self, identity: &IdentityAddress) -> Result<String, StoreError> {
        identity.validate()?;
        let expires_at = expiry_after(now_unix(), self.config.session_ttl);
        let mut inner = self.inner.write();
        loop {
            let cookie = new_cookie();
            if let Entry::Vacant(slot) = inner
                .sessions
                .entry((cookie.clone(), identity.domain().to_string()))
            {
                slot.insert(SessionRecord {
                    identity: identity.clone(),
                    expires_at,
                });
                tracing::debug!("issued session for {}", identity);
                return Ok(cookie);
            }
        }
    }

    async fn revoke_cookie(&self, cookie: &str, domain: &str) -> Result<bool, StoreError> {
        validate_domain(domain)?;
        Ok(self
            .inner
            .write()
            .sessions
            .remove(&(cookie.to_string(), domain.to_string()))
            .is_some())
    }
}

#[async_trait]
impl SerialLedger for MemoryStore {
    async fn last_serial(&self, issuer: &Fingerprint) -> Result<Option<u64>, StoreError> {
        Ok(self.inner.read().serials.get(issuer).copied())
    }

    async fn claim(&self, issuer: &Fingerprint, serial: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner.serials.entry(*issuer) {
            Entry::Occupied(mut last) => {
                if serial <= *last.get() {
                    return Err(StoreError::SerialReuse {
                        suggested: serial,
                        last: *last.get(),
                    });
                }
                last.insert(serial);
            }
            Entry::Vacant(slot) => {
                slot.insert(serial);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::crypto::KdfParams;

    fn store() -> MemoryStore {
        MemoryStore::with_config(StoreConfig {
            kdf: KdfParams::new(1, 64, 16).unwrap(),
            ..StoreConfig::default()
        })
    }

    fn alice() -> IdentityAddress {
        IdentityAddress::new("example.org", "alice").unwrap()
    }

    #[tokio::test]
    async fn test_store_then_key() {
        let store = store();
        store.store(&alice(), "hunter2").await.unwrap();
        let key = store.key(&alice()).await.unwrap();
        assert_eq!(
            key,
            store.config().kdf.derive_blocking(&alice(), "hunter2").unwrap()
        );
        assert_ne!(key.as_bytes(), b"hunter2");
    }

    #[tokio::test]
    async fn test_password_rotation_overwrites() {
        let store = store();
        store.store(&alice(), "one").await.unwrap();
        let first = store.key(&alice()).await.unwrap();
        store.store(&alice(), "two").await.unwrap();
        assert_ne!(store.key(&alice()).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_unknown_identity() {
        let store = store();
        let nobody = IdentityAddress::new("nowhere", "nonexistent").unwrap();
        assert!(matches!(
            store.key(&nobody).await,
            Err(StoreError::UnknownIdentity(id)) if id == nobody
        ));
    }

    #[tokio::test]
    async fn test_serial_ledger_is_monotonic() {
        let store = store();
        let issuer = Fingerprint::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(store.last_serial(&issuer).await.unwrap(), None);
        store.claim(&issuer, 1).await.unwrap();
        store.claim(&issuer, 5).await.unwrap();
        assert!(matches!(
            store.claim(&issuer, 5).await,
            Err(StoreError::SerialReuse { suggested: 5, last: 5 })
        ));
        assert!(matches!(
            store.claim(&issuer, 2).await,
            Err(StoreError::SerialReuse { last: 5, .. })
        ));
        assert_eq!(store.last_serial(&issuer).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_expired_session_is_purged() {
        let store = MemoryStore::with_config(StoreConfig {
            session_ttl: Duration::from_secs(0),
            ..StoreConfig::default()
        });
        let cookie = store.issue_cookie(&alice()).await.unwrap();
        assert!(matches!(
            store.id_from_cookie(&cookie, "example.org").await,
            Err(StoreError::UnknownSession)
        ));
        assert!(store.inner.read().sessions.is_empty());
    }

    #[tokio::test]
    async fn test_huge_session_ttl_does_not_expire_immediately() {
        let store = MemoryStore::with_config(StoreConfig {
            session_ttl: Duration::from_secs(u64::MAX),
            ..StoreConfig::default()
        });
        let cookie = store.issue_cookie(&alice()).await.unwrap();
        assert_eq!(
            store.id_from_cookie(&cookie, "example.org").await.unwrap(),
            alice()
        );
    }
}

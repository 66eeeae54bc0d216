//! Integration tests for certificate storage policies and session scoping

mod common;

use std::time::Duration;

use ::common::certificate::PrivateCertificate;
use ::common::store::{
    CertificateStorage, MemoryStore, ReplacementPolicy, SessionTokenStorage, StoreConfig,
    StoreError,
};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn pem(domain: &str) -> String {
    PrivateCertificate::generate_domain(domain, DAY)
        .unwrap()
        .certificate()
        .to_pem()
        .unwrap()
}

#[tokio::test]
async fn test_second_self_signed_rejected_by_default() {
    let store = common::fast_store();
    let first = pem("example.org");
    let second = pem("example.org");

    store.store_self_signed_certificate("example.org", &first).await.unwrap();
    assert!(matches!(
        store.store_self_signed_certificate("example.org", &second).await,
        Err(StoreError::CertificateExists(_))
    ));
    let kept = store.get_self_signed_certificate("example.org").await.unwrap();
    assert_eq!(kept.to_pem().unwrap(), first);

    // same certificate again is fine
    store.store_self_signed_certificate("example.org", &first).await.unwrap();
}

#[tokio::test]
async fn test_replace_policy_and_explicit_replace() {
    let store = MemoryStore::with_config(StoreConfig {
        replacement_policy: ReplacementPolicy::Replace,
        ..StoreConfig::default()
    });
    let first = pem("example.org");
    let second = pem("example.org");
    store.store_self_signed_certificate("example.org", &first).await.unwrap();
    store.store_self_signed_certificate("example.org", &second).await.unwrap();
    assert_eq!(
        store
            .get_self_signed_certificate("example.org")
            .await
            .unwrap()
            .to_pem()
            .unwrap(),
        second
    );

    let strict = common::fast_store();
    strict.store_self_signed_certificate("example.org", &first).await.unwrap();
    let old = strict
        .replace_self_signed_certificate("example.org", &second)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(old.to_pem().unwrap(), first);
}

#[tokio::test]
async fn test_get_never_issues() {
    let store = common::fast_store();
    assert!(matches!(
        store.get_self_signed_certificate("example.org").await,
        Err(StoreError::CertificateNotFound(_))
    ));
    assert!(matches!(
        store.get_private_certificate("example.org").await,
        Err(StoreError::CertificateNotFound(_))
    ));
    assert!(matches!(
        store.get_self_signed_certificate("example.org").await,
        Err(StoreError::CertificateNotFound(_))
    ));
}

#[tokio::test]
async fn test_add_private_never_overwrites() {
    let store = common::fast_store();
    let first = store.add_private_certificate("example.org", None).await.unwrap();
    assert!(matches!(
        store.add_private_certificate("example.org", None).await,
        Err(StoreError::CertificateExists(_))
    ));
    assert_eq!(store.get_private_certificate("example.org").await.unwrap(), first);

    let rotated = store
        .rotate_private_certificate("example.org", None)
        .await
        .unwrap();
    assert_ne!(rotated, first);
    assert_eq!(
        &store.get_self_signed_certificate("example.org").await.unwrap(),
        rotated.certificate()
    );
    assert!(matches!(
        store.rotate_private_certificate("other.org", None).await,
        Err(StoreError::CertificateNotFound(_))
    ));
}

#[tokio::test]
async fn test_add_private_with_existing_certificate() {
    let store = common::fast_store();
    let imported = PrivateCertificate::generate_domain("example.org", DAY).unwrap();
    let stored = store
        .add_private_certificate("example.org", Some(imported.clone()))
        .await
        .unwrap();
    assert_eq!(stored, imported);

    // a public half that does not match blocks the bootstrap
    let other = common::fast_store();
    other
        .store_self_signed_certificate("example.org", &pem("example.org"))
        .await
        .unwrap();
    assert!(matches!(
        other.add_private_certificate("example.org", Some(imported)).await,
        Err(StoreError::CertificateExists(_))
    ));
}

#[tokio::test]
async fn test_foreign_certificate_rejected() {
    let store = common::fast_store();
    assert!(matches!(
        store.store_self_signed_certificate("example.org", &pem("evil.org")).await,
        Err(StoreError::InvalidCertificate(_))
    ));
    assert!(matches!(
        store.get_self_signed_certificate("bad domain").await,
        Err(StoreError::MalformedIdentity(_))
    ));
}

#[tokio::test]
async fn test_sessions_are_domain_scoped() {
    let store = common::fast_store();
    let alice = common::id("alice@example.org");
    let cookie = store.issue_cookie(&alice).await.unwrap();

    assert_eq!(store.id_from_cookie(&cookie, "example.org").await.unwrap(), alice);
    assert!(matches!(
        store.id_from_cookie(&cookie, "other.org").await,
        Err(StoreError::UnknownSession)
    ));

    assert!(store.revoke_cookie(&cookie, "example.org").await.unwrap());
    assert!(!store.revoke_cookie(&cookie, "example.org").await.unwrap());
    assert!(matches!(
        store.id_from_cookie(&cookie, "example.org").await,
        Err(StoreError::UnknownSession)
    ));
}

#[tokio::test]
async fn test_owned_domain_public_half_follows_private() {
    let store = MemoryStore::with_config(StoreConfig {
        replacement_policy: ReplacementPolicy::Replace,
        ..StoreConfig::default()
    });
    let private = store.add_private_certificate("example.org", None).await.unwrap();
    let foreign = pem("example.org");

    assert!(matches!(
        store.replace_self_signed_certificate("example.org", &foreign).await,
        Err(StoreError::LocallyOwned(_))
    ));
    assert!(matches!(
        store.store_self_signed_certificate("example.org", &foreign).await,
        Err(StoreError::LocallyOwned(_))
    ));
    assert_eq!(
        &store.get_self_signed_certificate("example.org").await.unwrap(),
        private.certificate()
    );

    // re-asserting the matching public half is still fine
    let own = private.certificate().to_pem().unwrap();
    let previous = store
        .replace_self_signed_certificate("example.org", &own)
        .await
        .unwrap();
    assert_eq!(previous.as_ref(), Some(private.certificate()));
}

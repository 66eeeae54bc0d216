//! Readers racing writers see whole values, and racing signers share no serial

mod common;

use std::sync::Arc;
use std::time::Duration;

use ::common::authority::{AuthorityError, CertificateAuthority, DomainAuthority};
use ::common::certificate::{CertificateRequest, PrivateCertificate};
use ::common::crypto::SecretKey;
use ::common::store::{CertificateStorage, UserStore};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_key_during_password_change() {
    let store = common::fast_store();
    let alice = common::id("alice@example.org");
    let old = store.config().kdf.derive_blocking(&alice, "old").unwrap();
    let new = store.config().kdf.derive_blocking(&alice, "new").unwrap();
    store.store(&alice, "old").await.unwrap();

    let writer = {
        let (store, alice) = (store.clone(), alice.clone());
        tokio::spawn(async move { store.store(&alice, "new").await })
    };
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let (store, alice) = (store.clone(), alice.clone());
            tokio::spawn(async move { store.key(&alice).await })
        })
        .collect();

    writer.await.unwrap().unwrap();
    for reader in readers {
        let seen = reader.await.unwrap().unwrap();
        assert!(seen == old || seen == new);
    }
    assert_eq!(store.key(&alice).await.unwrap(), new);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_trust_read_during_replace() {
    let store = common::fast_store();
    let first = PrivateCertificate::generate_domain("example.org", DAY).unwrap();
    let second = PrivateCertificate::generate_domain("example.org", DAY).unwrap();
    store
        .store_self_signed_certificate("example.org", &first.certificate().to_pem().unwrap())
        .await
        .unwrap();

    let writer = {
        let store = store.clone();
        let pem = second.certificate().to_pem().unwrap();
        tokio::spawn(async move { store.replace_self_signed_certificate("example.org", &pem).await })
    };
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.get_self_signed_certificate("example.org").await })
        })
        .collect();

    writer.await.unwrap().unwrap();
    for reader in readers {
        let seen = reader.await.unwrap().unwrap();
        assert!(&seen == first.certificate() || &seen == second.certificate());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_signers_share_no_serial() {
    let store = common::fast_store();
    let domain = store.add_private_certificate("example.org", None).await.unwrap();
    let authority = Arc::new(DomainAuthority::new(Arc::new(store.clone())));

    let signers: Vec<_> = ["alice", "bob", "carol", "dave"]
        .into_iter()
        .map(|user| {
            let (authority, domain) = (authority.clone(), domain.clone());
            tokio::spawn(async move {
                let request = CertificateRequest::new(
                    common::id(&format!("{}@example.org", user)),
                    &SecretKey::generate(),
                    7,
                );
                authority.sign_certificate_request(&request, &domain, 7).await
            })
        })
        .collect();

    let mut issued = 0;
    for signer in signers {
        match signer.await.unwrap() {
            Ok(certificate) => {
                assert_eq!(certificate.serial(), 7);
                issued += 1;
            }
            Err(AuthorityError::SerialReuse { suggested: 7, last: 7 }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(issued, 1);
}

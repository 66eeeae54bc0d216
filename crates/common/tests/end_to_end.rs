//! Integration tests running the whole trust chain: bootstrap a domain,
//! authenticate a connection, issue certificates and sessions

mod common;

use std::sync::Arc;

use ::common::authority::{CertificateAuthority, DomainAuthority};
use ::common::certificate::{CertificateRequest, PrivateCertificate};
use ::common::crypto::SecretKey;
use ::common::store::{CertificateStorage, SessionTokenStorage, StoreError, UserStore};
use ::common::transport::{HandshakeState, LocalCredentials, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_bootstrap_domain_and_authenticate() {
    let store = common::fast_store();

    let private = store.add_private_certificate("example.org", None).await.unwrap();
    let public = store.get_self_signed_certificate("example.org").await.unwrap();
    assert_eq!(&public, private.certificate());
    assert_eq!(public.public_key(), &private.secret_key().public());

    store.add_private_certificate("host.net", None).await.unwrap();

    let ((client, c), (server, s)) = common::connect(
        common::credentials(&store, "alice@example.org").await,
        &store,
        common::credentials(&store, "server@host.net").await,
        &store,
    )
    .await;

    c.unwrap();
    assert_eq!(s.unwrap(), common::id("alice@example.org"));
    assert_eq!(server.state(), HandshakeState::Authenticated);
    let peer = server.q2q_peer().unwrap();
    assert_eq!(peer.domain(), "example.org");
    assert_eq!(peer.username(), "alice");
    assert_eq!(client.q2q_peer().unwrap(), &common::id("server@host.net"));
}

#[tokio::test]
async fn test_unknown_domain_never_authenticates() {
    let client_store = common::fast_store();
    client_store.add_private_certificate("example.org", None).await.unwrap();

    let server_store = common::fast_store();
    let server_domain = server_store
        .add_private_certificate("host.net", None)
        .await
        .unwrap();
    client_store
        .store_self_signed_certificate("host.net", &server_domain.certificate().to_pem().unwrap())
        .await
        .unwrap();

    let ((client, c), (server, s)) = common::connect(
        common::credentials(&client_store, "alice@example.org").await,
        &client_store,
        common::credentials(&server_store, "server@host.net").await,
        &server_store,
    )
    .await;

    assert!(matches!(s, Err(TransportError::UnknownDomain(_))));
    assert_eq!(server.state(), HandshakeState::Failed);
    assert!(matches!(server.q2q_peer(), Err(TransportError::NotAuthenticated)));
    assert!(c.is_err());
    assert_eq!(client.state(), HandshakeState::Failed);
}

#[tokio::test]
async fn test_issued_user_certificate_session_round_trip() {
    let store = common::fast_store();
    let domain = store.add_private_certificate("example.org", None).await.unwrap();
    store.add_private_certificate("host.net", None).await.unwrap();
    let authority = DomainAuthority::new(Arc::new(store.clone()));

    let alice = common::id("alice@example.org");
    let key = SecretKey::generate();
    let serial = authority.next_serial(domain.certificate()).await.unwrap();
    let issued = authority
        .sign_certificate_request(&CertificateRequest::new(alice.clone(), &key, serial), &domain, serial)
        .await
        .unwrap();
    let credentials =
        LocalCredentials::new(alice.clone(), PrivateCertificate::new(issued, key).unwrap()).unwrap();

    let ((client, c), (server, s)) = common::connect(
        credentials,
        &store,
        common::credentials(&store, "server@host.net").await,
        &store,
    )
    .await;
    c.unwrap();
    s.unwrap();

    let server = server.into_authenticated().unwrap();
    let cookie = store.issue_cookie(server.q2q_peer()).await.unwrap();
    assert_eq!(store.id_from_cookie(&cookie, "example.org").await.unwrap(), alice);

    let mut client = client.into_authenticated().unwrap();
    let mut server = server;
    client.write_all(cookie.as_bytes()).await.unwrap();
    let mut echoed = vec![0u8; cookie.len()];
    server.read_exact(&mut echoed).await.unwrap();
    assert_eq!(echoed, cookie.as_bytes());
}

#[tokio::test]
async fn test_unknown_identity_key() {
    let store = common::fast_store();
    let nobody = common::id("nonexistent@nowhere");
    assert!(matches!(
        store.key(&nobody).await,
        Err(StoreError::UnknownIdentity(_))
    ));
}

#[tokio::test]
async fn test_derived_key_is_deterministic() {
    let first = common::fast_store();
    let second = common::fast_store();
    let alice = common::id("alice@example.org");

    first.store(&alice, "correct horse").await.unwrap();
    second.store(&alice, "correct horse").await.unwrap();
    let key = first.key(&alice).await.unwrap();
    assert_eq!(key, second.key(&alice).await.unwrap());
    assert_ne!(key.as_bytes(), b"correct horse".as_slice());

    let bob = common::id("bob@example.org");
    first.store(&bob, "correct horse").await.unwrap();
    assert_ne!(first.key(&bob).await.unwrap(), key);
}

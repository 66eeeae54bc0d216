//! Shared test utilities for store and transport integration tests
#![allow(dead_code)]

use std::sync::Arc;

use common::crypto::KdfParams;
use common::identity::IdentityAddress;
use common::store::{MemoryStore, StoreConfig};
use common::transport::{LocalCredentials, Q2QTransport, TransportError};
use tokio::io::DuplexStream;

pub type Side = Q2QTransport<DuplexStream>;

pub fn id(s: &str) -> IdentityAddress {
    s.parse().unwrap()
}

/// A memory store with cheap key derivation
pub fn fast_store() -> MemoryStore {
    MemoryStore::with_config(StoreConfig {
        kdf: KdfParams::new(1, 64, 16).unwrap(),
        ..StoreConfig::default()
    })
}

pub async fn credentials(store: &MemoryStore, identity: &str) -> LocalCredentials {
    LocalCredentials::from_store(id(identity), store).await.unwrap()
}

/// Run both ends of a handshake over an in-memory pipe
pub async fn connect(
    left: LocalCredentials,
    left_trust: &MemoryStore,
    right: LocalCredentials,
    right_trust: &MemoryStore,
) -> (
    (Side, Result<IdentityAddress, TransportError>),
    (Side, Result<IdentityAddress, TransportError>),
) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let mut l = Q2QTransport::new(a, left, Arc::new(left_trust.clone()));
    let mut r = Q2QTransport::new(b, right, Arc::new(right_trust.clone()));
    let (lr, rr) = tokio::join!(l.handshake(), r.handshake());
    ((l, lr), (r, rr))
}

//! Shared helpers for the daemon integration tests
#![allow(dead_code)]

use std::time::Duration;

use common::crypto::KdfParams;
use common::identity::IdentityAddress;
use common::store::StoreConfig;
use q2q_daemon::Database;

pub fn id(s: &str) -> IdentityAddress {
    s.parse().unwrap()
}

pub fn fast_config() -> StoreConfig {
    StoreConfig {
        kdf: KdfParams::new(1, 64, 16).unwrap(),
        ..StoreConfig::default()
    }
}

/// A private in-memory sqlite database with cheap key derivation
pub async fn database() -> Database {
    Database::in_memory(fast_config()).await.unwrap()
}

pub async fn database_with(config: StoreConfig) -> Database {
    Database::in_memory(config).await.unwrap()
}

pub fn expired_sessions() -> StoreConfig {
    StoreConfig {
        session_ttl: Duration::ZERO,
        ..fast_config()
    }
}

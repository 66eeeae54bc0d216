use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use common::prelude::{IdentityAddress, StoreConfig};

#[derive(Debug, Clone)]
pub struct Config {
    /// address for the q2q listener to bind
    pub listen_addr: SocketAddr,
    /// identity the daemon authenticates as; its domain must have a
    ///  private certificate in the store
    pub identity: IdentityAddress,

    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,
    pub store: StoreConfig,

    /// how long a peer gets to complete the handshake
    pub handshake_timeout: Duration,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

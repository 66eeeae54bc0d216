use std::sync::Arc;
use std::time::Duration;

use url::Url;

use common::prelude::{CertificateStorage, LocalCredentials, StoreError, TransportError};

use crate::database::{Database, DatabaseSetupError};
use crate::service_config::Config;

/// Everything a running daemon shares between connections
#[derive(Clone, Debug)]
pub struct State {
    database: Database,
    credentials: LocalCredentials,
    handshake_timeout: Duration,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup database
        let sqlite_database_url = match config.sqlite_path {
            Some(ref path) => {
                if !path.exists() {
                    return Err(StateSetupError::DatabasePathDoesNotExist);
                }
                Url::parse(&format!("sqlite://{}", path.display()))
                    .map_err(|_| StateSetupError::InvalidDatabaseUrl)
            }
            // otherwise just set up an in-memory database
            None => Url::parse("sqlite::memory:").map_err(|_| StateSetupError::InvalidDatabaseUrl),
        }?;
        tracing::info!("Database URL: {:?}", sqlite_database_url);
        let database = Database::connect(&sqlite_database_url, config.store).await?;

        // 2. Load the credentials we authenticate with
        let credentials = LocalCredentials::from_store(config.identity.clone(), &database)
            .await
            .map_err(|e| match e {
                TransportError::Store(StoreError::CertificateNotFound(domain)) => {
                    StateSetupError::NoDomainCertificate(domain)
                }
                other => StateSetupError::Credentials(other),
            })?;
        tracing::info!(identity = %config.identity, "daemon credentials loaded");

        Ok(Self::new(database, credentials, config.handshake_timeout))
    }

    pub fn new(
        database: Database,
        credentials: LocalCredentials,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            database,
            credentials,
            handshake_timeout,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn credentials(&self) -> &LocalCredentials {
        &self.credentials
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// The certificate store peers are verified against
    pub fn trust(&self) -> Arc<dyn CertificateStorage> {
        Arc::new(self.database.clone())
    }
}

impl AsRef<Database> for State {
    fn as_ref(&self) -> &Database {
        self.database()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Database path does not exist")]
    DatabasePathDoesNotExist,
    #[error("Database setup error")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,
    #[error("no private certificate for domain {0}. Run 'q2q domain add' first")]
    NoDomainCertificate(String),
    #[error("unable to load credentials: {0}")]
    Credentials(TransportError),
}

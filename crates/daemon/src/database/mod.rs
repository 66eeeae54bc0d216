//! sqlite implementations of the store traits
//!
//! One [`Database`] implements every store trait from `common::store` over
//! a single pool. Failures of sqlite itself surface as
//! [`StoreError::Unavailable`], the only retryable class.

mod certificate_store;
mod serial_ledger;
mod session_store;
mod sqlite;
mod user_store;

use std::ops::Deref;

use sqlx::SqlitePool;

use common::store::{StoreConfig, StoreError};

#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
    config: StoreConfig,
}

impl Database {
    pub async fn connect(
        database_url: &url::Url,
        config: StoreConfig,
    ) -> Result<Self, DatabaseSetupError> {
        if database_url.scheme() == "sqlite" {
            let db = sqlite::connect_sqlite(database_url).await?;
            sqlite::migrate_sqlite(&db).await?;
            return Ok(Database::new(db, config));
        }

        Err(DatabaseSetupError::UnknownDbType(
            database_url.scheme().to_string(),
        ))
    }

    /// A fresh private database, gone when the pool closes
    pub async fn in_memory(config: StoreConfig) -> Result<Self, DatabaseSetupError> {
        let url = url::Url::parse(sqlite::MEMORY_URL)
            .map_err(|e| DatabaseSetupError::InvalidUrl(e.to_string()))?;
        Self::connect(&url, config).await
    }

    pub fn new(pool: SqlitePool, config: StoreConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

/// Anything sqlite reports is treated as the backend being unavailable
pub(crate) fn unavailable(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable(error.into())
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(sqlx::migrate::MigrateError),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(sqlx::Error),

    #[error("requested database type was not recognized: {0}")]
    UnknownDbType(String),

    #[error("invalid database url: {0}")]
    InvalidUrl(String),
}

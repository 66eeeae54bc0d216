use async_trait::async_trait;
use sqlx::Row;

use common::certificate::now_unix;
use common::crypto::{DerivedKey, KDF_VERSION};
use common::identity::IdentityAddress;
use common::store::{StoreError, UserStore};

use super::{unavailable, Database};

#[async_trait]
impl UserStore for Database {
    async fn store(&self, identity: &IdentityAddress, password: &str) -> Result<(), StoreError> {
        identity.validate()?;
        let key = self.config().kdf.derive(identity, password).await?;

        // a single upsert, readers see the old row or the new one
        sqlx::query(
            r#"
            INSERT INTO user_keys (domain, username, derived_key, kdf_version, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(domain, username) DO UPDATE SET
                derived_key = excluded.derived_key,
                kdf_version = excluded.kdf_version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(identity.domain())
        .bind(identity.username())
        .bind(key.as_bytes())
        .bind(KDF_VERSION as i64)
        .bind(now_unix())
        .execute(&**self)
        .await
        .map_err(unavailable)?;

        tracing::debug!("stored derived key for {}", identity);
        Ok(())
    }

    async fn key(&self, identity: &IdentityAddress) -> Result<DerivedKey, StoreError> {
        identity.validate()?;
        let row = sqlx::query(
            r#"
            SELECT derived_key
            FROM user_keys
            WHERE domain = ? AND username = ?
            "#,
        )
        .bind(identity.domain())
        .bind(identity.username())
        .fetch_optional(&**self)
        .await
        .map_err(unavailable)?;

        match row {
            Some(row) => Ok(DerivedKey::from_bytes(row.get::<Vec<u8>, _>("derived_key"))),
            None => Err(StoreError::UnknownIdentity(identity.clone())),
        }
    }
}

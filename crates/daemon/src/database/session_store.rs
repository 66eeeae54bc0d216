use async_trait::async_trait;
use sqlx::Row;

use common::certificate::{expiry_after, now_unix};
use common::identity::{validate_domain, IdentityAddress};
use common::store::{new_cookie, SessionTokenStorage, StoreError};

use super::{unavailable, Database};

#[async_trait]
impl SessionTokenStorage for Database {
    async fn id_from_cookie(
        &self,
        cookie: &str,
        domain: &str,
    ) -> Result<IdentityAddress, StoreError> {
        validate_domain(domain)?;
        let row = sqlx::query(
            r#"
            SELECT username, expires_at
            FROM sessions
            WHERE cookie = ? AND domain = ?
            "#,
        )
        .bind(cookie)
        .bind(domain)
        .fetch_optional(&**self)
        .await
        .map_err(unavailable)?;

        let Some(row) = row else {
            return Err(StoreError::UnknownSession);
        };
        if row.get::<i64, _>("expires_at") <= now_unix() {
            self.revoke_cookie(cookie, domain).await?;
            return Err(StoreError::UnknownSession);
        }
        Ok(IdentityAddress::new(domain, row.get::<String, _>("username"))?)
    }

    async fn issue_cookie(&self, identity: &IdentityAddress) -> Result<String, StoreError> {
        identity.validate()?;
        let now = now_unix();
        let expires_at = expiry_after(now, self.config().session_ttl);

        sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&**self)
            .await
            .map_err(unavailable)?;

        loop {
            let cookie = new_cookie();
            let result = sqlx::query(
                r#"
                INSERT INTO sessions (cookie, domain, username, expires_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(cookie, domain) DO NOTHING
                "#,
            )
            .bind(&cookie)
            .bind(identity.domain())
            .bind(identity.username())
            .bind(expires_at)
            .execute(&**self)
            .await
            .map_err(unavailable)?;

            if result.rows_affected() == 1 {
                tracing::debug!("issued session for {}", identity);
                return Ok(cookie);
            }
        }
    }

    async fn revoke_cookie(&self, cookie: &str, domain: &str) -> Result<bool, StoreError> {
        validate_domain(domain)?;
        let result = sqlx::query("DELETE FROM sessions WHERE cookie = ? AND domain = ?")
            .bind(cookie)
            .bind(domain)
            .execute(&**self)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }
}

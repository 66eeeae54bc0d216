use async_trait::async_trait;
use sqlx::Row;

use common::certificate::Fingerprint;
use common::store::{SerialLedger, StoreError};

use super::{unavailable, Database};

/// Serials are stored as zero padded text so sqlite orders them as u64
fn encode_serial(serial: u64) -> String {
    format!("{:020}", serial)
}

fn decode_serial(stored: &str) -> Result<u64, StoreError> {
    stored
        .parse()
        .map_err(|e| StoreError::Unavailable(anyhow::anyhow!("corrupt serial {:?}: {}", stored, e)))
}

#[async_trait]
impl SerialLedger for Database {
    async fn last_serial(&self, issuer: &Fingerprint) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT last_serial FROM serials WHERE issuer = ?")
            .bind(issuer.to_hex())
            .fetch_optional(&**self)
            .await
            .map_err(unavailable)?;

        row.map(|row| decode_serial(&row.get::<String, _>("last_serial")))
            .transpose()
    }

    async fn claim(&self, issuer: &Fingerprint, serial: u64) -> Result<(), StoreError> {
        // check-and-set in one statement: the update only applies when the
        // new serial is strictly greater
        let result = sqlx::query(
            r#"
            INSERT INTO serials (issuer, last_serial)
            VALUES (?, ?)
            ON CONFLICT(issuer) DO UPDATE SET
                last_serial = excluded.last_serial
            WHERE excluded.last_serial > serials.last_serial
            "#,
        )
        .bind(issuer.to_hex())
        .bind(encode_serial(serial))
        .execute(&**self)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            let last = self.last_serial(issuer).await?.unwrap_or_default();
            return Err(StoreError::SerialReuse {
                suggested: serial,
                last,
            });
        }
        Ok(())
    }
}

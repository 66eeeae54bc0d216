use async_trait::async_trait;
use sqlx::{Row, Sqlite, Transaction};

use common::certificate::{now_unix, Certificate, PrivateCertificate};
use common::identity::validate_domain;
use common::store::{
    parse_self_signed, prepare_private_certificate, CertificateStorage, ReplacementPolicy,
    StoreError,
};

use super::{unavailable, Database};

/// Both halves of a domain's record, as stored
struct DomainRecord {
    self_signed: Option<String>,
    private: Option<String>,
}

impl DomainRecord {
    fn self_signed(&self) -> Result<Option<Certificate>, StoreError> {
        Ok(self
            .self_signed
            .as_deref()
            .map(Certificate::from_pem)
            .transpose()?)
    }

    fn private(&self) -> Result<Option<PrivateCertificate>, StoreError> {
        Ok(self
            .private
            .as_deref()
            .map(PrivateCertificate::from_pem)
            .transpose()?)
    }
}

/// Take the write lock before reading, so the read-modify-write below never
/// has to upgrade a shared lock. Leaves an empty row that rollback removes.
async fn lock_domain(tx: &mut Transaction<'_, Sqlite>, domain: &str) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO certificates (domain, updated_at)
        VALUES (?, ?)
        ON CONFLICT(domain) DO NOTHING
        "#,
    )
    .bind(domain)
    .bind(now_unix())
    .execute(&mut **tx)
    .await
    .map_err(unavailable)?;
    Ok(())
}

async fn read_record(
    tx: &mut Transaction<'_, Sqlite>,
    domain: &str,
) -> Result<DomainRecord, StoreError> {
    let row = sqlx::query("SELECT self_signed, private FROM certificates WHERE domain = ?")
        .bind(domain)
        .fetch_optional(&mut **tx)
        .await
        .map_err(unavailable)?;
    Ok(match row {
        Some(row) => DomainRecord {
            self_signed: row.get("self_signed"),
            private: row.get("private"),
        },
        None => DomainRecord {
            self_signed: None,
            private: None,
        },
    })
}

async fn write_record(
    tx: &mut Transaction<'_, Sqlite>,
    domain: &str,
    self_signed: &str,
    private: Option<&str>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE certificates
        SET self_signed = ?, private = COALESCE(?, private), updated_at = ?
        WHERE domain = ?
        "#,
    )
    .bind(self_signed)
    .bind(private)
    .bind(now_unix())
    .bind(domain)
    .execute(&mut **tx)
    .await
    .map_err(unavailable)?;
    Ok(())
}

#[async_trait]
impl CertificateStorage for Database {
    async fn get_self_signed_certificate(&self, domain: &str) -> Result<Certificate, StoreError> {
        validate_domain(domain)?;
        let row = sqlx::query("SELECT self_signed FROM certificates WHERE domain = ?")
            .bind(domain)
            .fetch_optional(&**self)
            .await
            .map_err(unavailable)?;

        match row.and_then(|row| row.get::<Option<String>, _>("self_signed")) {
            Some(pem) => Ok(Certificate::from_pem(&pem)?),
            None => Err(StoreError::CertificateNotFound(domain.to_string())),
        }
    }

    async fn store_self_signed_certificate(
        &self,
        domain: &str,
        certificate: &str,
    ) -> Result<(), StoreError> {
        let certificate = parse_self_signed(domain, certificate)?;
        // re-encoded, so identical certificates compare equal as text
        let pem = certificate.to_pem()?;
        let replace = self.config().replacement_policy == ReplacementPolicy::Replace;

        let result = sqlx::query(
            r#"
            INSERT INTO certificates (domain, self_signed, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(domain) DO UPDATE SET
                self_signed = excluded.self_signed,
                updated_at = excluded.updated_at
            WHERE (? AND certificates.private IS NULL)
                OR certificates.self_signed IS NULL
                OR certificates.self_signed = excluded.self_signed
            "#,
        )
        .bind(domain)
        .bind(&pem)
        .bind(now_unix())
        .bind(replace)
        .execute(&**self)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            // with replacement allowed only a local private certificate blocks the swap
            return Err(if replace {
                StoreError::LocallyOwned(domain.to_string())
            } else {
                StoreError::CertificateExists(domain.to_string())
            });
        }
        tracing::info!("stored self-signed certificate for {}", domain);
        Ok(())
    }

    async fn replace_self_signed_certificate(
        &self,
        domain: &str,
        certificate: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        let certificate = parse_self_signed(domain, certificate)?;
        let pem = certificate.to_pem()?;

        let mut tx = self.begin().await.map_err(unavailable)?;
        lock_domain(&mut tx, domain).await?;
        let record = read_record(&mut tx, domain).await?;
        if let Some(private) = record.private()? {
            if private.certificate() != &certificate {
                return Err(StoreError::LocallyOwned(domain.to_string()));
            }
        }
        let previous = record.self_signed()?;
        write_record(&mut tx, domain, &pem, None).await?;
        tx.commit().await.map_err(unavailable)?;

        tracing::info!("replaced self-signed certificate for {}", domain);
        Ok(previous)
    }

    async fn get_private_certificate(
        &self,
        domain: &str,
    ) -> Result<PrivateCertificate, StoreError> {
        validate_domain(domain)?;
        let row = sqlx::query("SELECT private FROM certificates WHERE domain = ?")
            .bind(domain)
            .fetch_optional(&**self)
            .await
            .map_err(unavailable)?;

        match row.and_then(|row| row.get::<Option<String>, _>("private")) {
            Some(pem) => Ok(PrivateCertificate::from_pem(&pem)?),
            None => Err(StoreError::CertificateNotFound(domain.to_string())),
        }
    }

    async fn add_private_certificate(
        &self,
        domain: &str,
        existing: Option<PrivateCertificate>,
    ) -> Result<PrivateCertificate, StoreError> {
        let private = prepare_private_certificate(domain, existing, self.config().certificate_validity)?;
        let public_pem = private.certificate().to_pem()?;
        let private_pem = private.to_pem()?;

        let mut tx = self.begin().await.map_err(unavailable)?;
        lock_domain(&mut tx, domain).await?;
        let record = read_record(&mut tx, domain).await?;
        if record.private.is_some() {
            return Err(StoreError::CertificateExists(domain.to_string()));
        }
        if let Some(current) = record.self_signed()? {
            if &current != private.certificate() {
                return Err(StoreError::CertificateExists(domain.to_string()));
            }
        }
        write_record(&mut tx, domain, &public_pem, Some(&private_pem)).await?;
        tx.commit().await.map_err(unavailable)?;

        tracing::info!("added private certificate for {}", domain);
        Ok(private)
    }

    async fn rotate_private_certificate(
        &self,
        domain: &str,
        replacement: Option<PrivateCertificate>,
    ) -> Result<PrivateCertificate, StoreError> {
        let private =
            prepare_private_certificate(domain, replacement, self.config().certificate_validity)?;
        let public_pem = private.certificate().to_pem()?;
        let private_pem = private.to_pem()?;

        let mut tx = self.begin().await.map_err(unavailable)?;
        lock_domain(&mut tx, domain).await?;
        if read_record(&mut tx, domain).await?.private.is_none() {
            return Err(StoreError::CertificateNotFound(domain.to_string()));
        }
        write_record(&mut tx, domain, &public_pem, Some(&private_pem)).await?;
        tx.commit().await.map_err(unavailable)?;

        tracing::info!("rotated private certificate for {}", domain);
        Ok(private)
    }
}

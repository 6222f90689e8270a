//! Document sequence repository
//!
//! Per-(certificate type, year) counters used to number certificates.
//!
//! The increment is a single `INSERT ... ON CONFLICT DO UPDATE ... RETURNING`
//! statement, so the database serializes concurrent allocations for one key.
//! `next_number` takes a connection so callers can run it inside the same
//! transaction as the write that consumes the number.

use crate::db::DynDatabasePool;
use crate::models::{AllocatedNumber, CertificateType, DocumentSequence};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Document sequence repository trait
#[async_trait]
pub trait DocumentSequenceRepository: Send + Sync {
    /// Atomically increment the counter for (type, year) and return the new value.
    ///
    /// The row is created with `current_number = 1` on first use. An existing
    /// row keeps its stored prefix; `prefix_code` only applies on creation.
    async fn next_number(
        &self,
        conn: &mut SqliteConnection,
        certificate_type: CertificateType,
        year: i32,
        prefix_code: &str,
    ) -> Result<AllocatedNumber>;

    /// Get the counter for (type, year)
    async fn get(
        &self,
        certificate_type: CertificateType,
        year: i32,
    ) -> Result<Option<DocumentSequence>>;

    /// Create the row with `current_number = 0` if absent, or change the prefix of
    /// an existing row. The counter is never touched.
    async fn seed(
        &self,
        certificate_type: CertificateType,
        year: i32,
        prefix_code: &str,
    ) -> Result<DocumentSequence>;

    /// List all counters, newest year first
    async fn list(&self) -> Result<Vec<DocumentSequence>>;
}

/// SQLx-based document sequence repository implementation
pub struct SqlxDocumentSequenceRepository {
    pool: DynDatabasePool,
}

impl SqlxDocumentSequenceRepository {
    /// Create a new SQLx document sequence repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn DocumentSequenceRepository> {
        Arc::new(Self::new(pool))
    }

    fn sqlite(&self) -> &SqlitePool {
        self.pool.sqlite()
    }
}

#[async_trait]
impl DocumentSequenceRepository for SqlxDocumentSequenceRepository {
    async fn next_number(
        &self,
        conn: &mut SqliteConnection,
        certificate_type: CertificateType,
        year: i32,
        prefix_code: &str,
    ) -> Result<AllocatedNumber> {
        let row = sqlx::query(
            r#"
            INSERT INTO document_sequences (certificate_type, year, current_number, prefix_code, updated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(certificate_type, year) DO UPDATE
            SET current_number = current_number + 1, updated_at = excluded.updated_at
            RETURNING current_number, prefix_code
            "#,
        )
        .bind(certificate_type.as_str())
        .bind(year)
        .bind(prefix_code)
        .bind(Utc::now())
        .fetch_one(conn)
        .await
        .with_context(|| {
            format!(
                "Failed to allocate document number for {} {}",
                certificate_type, year
            )
        })?;

        Ok(AllocatedNumber {
            certificate_type,
            year,
            number: row.get("current_number"),
            prefix_code: row.get("prefix_code"),
        })
    }

    async fn get(
        &self,
        certificate_type: CertificateType,
        year: i32,
    ) -> Result<Option<DocumentSequence>> {
        let row = sqlx::query(
            r#"
            SELECT certificate_type, year, current_number, prefix_code, updated_at
            FROM document_sequences
            WHERE certificate_type = ? AND year = ?
            "#,
        )
        .bind(certificate_type.as_str())
        .bind(year)
        .fetch_optional(self.sqlite())
        .await
        .context("Failed to get document sequence")?;

        row.as_ref().map(row_to_sequence).transpose()
    }

    async fn seed(
        &self,
        certificate_type: CertificateType,
        year: i32,
        prefix_code: &str,
    ) -> Result<DocumentSequence> {
        sqlx::query(
            r#"
            INSERT INTO document_sequences (certificate_type, year, current_number, prefix_code, updated_at)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT(certificate_type, year) DO UPDATE
            SET prefix_code = excluded.prefix_code, updated_at = excluded.updated_at
            "#,
        )
        .bind(certificate_type.as_str())
        .bind(year)
        .bind(prefix_code)
        .bind(Utc::now())
        .execute(self.sqlite())
        .await
        .context("Failed to seed document sequence")?;

        self.get(certificate_type, year)
            .await?
            .context("Failed to retrieve seeded document sequence")
    }

    async fn list(&self) -> Result<Vec<DocumentSequence>> {
        let rows = sqlx::query(
            r#"
            SELECT certificate_type, year, current_number, prefix_code, updated_at
            FROM document_sequences
            ORDER BY year DESC, certificate_type
            "#,
        )
        .fetch_all(self.sqlite())
        .await
        .context("Failed to list document sequences")?;

        rows.iter().map(row_to_sequence).collect()
    }
}

fn row_to_sequence(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentSequence> {
    let type_str: String = row.get("certificate_type");
    let certificate_type = CertificateType::from_str(&type_str)
        .with_context(|| format!("Invalid certificate type in database: {}", type_str))?;

    Ok(DocumentSequence {
        certificate_type,
        year: row.get("year"),
        current_number: row.get("current_number"),
        prefix_code: row.get("prefix_code"),
        updated_at: row.get("updated_at"),
    })
}

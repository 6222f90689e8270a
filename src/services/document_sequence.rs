//! Document sequence allocator
//!
//! Hands out certificate numbers `{prefix}/{number}/{year}` from per-(type, year)
//! counters. Each allocation is one atomic upsert, so concurrent callers for
//! the same key always receive distinct, consecutive numbers. Keys are
//! independent of each other.
//!
//! `allocate` runs on a caller-supplied connection so that issuing a
//! certificate can consume the number and insert the record in a single
//! transaction: either both persist or neither does.

use std::sync::Arc;

use sqlx::SqliteConnection;

use crate::db::repositories::DocumentSequenceRepository;
use crate::db::DynDatabasePool;
use crate::models::{AllocatedNumber, CertificateType, DocumentSequence};

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// The counter could not be read or written
    #[error("Document number allocation failed: {0}")]
    Persistence(#[from] anyhow::Error),

    /// A number handed out by the counter was already in use.
    /// Reported to the caller, never retried.
    #[error("Document number {number} for {certificate_type} {year} is already in use")]
    Conflict {
        certificate_type: CertificateType,
        year: i32,
        number: i64,
    },
}

impl AllocationError {
    /// Conflict error for a number that could not be recorded
    pub fn conflict(allocated: &AllocatedNumber) -> Self {
        AllocationError::Conflict {
            certificate_type: allocated.certificate_type,
            year: allocated.year,
            number: allocated.number,
        }
    }
}

/// Whether an error chain bottoms out in a SQLite UNIQUE constraint failure
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db)) if db.is_unique_violation()
    )
}

pub struct DocumentSequenceAllocator {
    pool: DynDatabasePool,
    sequence_repo: Arc<dyn DocumentSequenceRepository>,
}

impl DocumentSequenceAllocator {
    pub fn new(pool: DynDatabasePool, sequence_repo: Arc<dyn DocumentSequenceRepository>) -> Self {
        Self {
            pool,
            sequence_repo,
        }
    }

    /// Reserve and format the next number for (type, year) in its own transaction.
    ///
    /// `prefix_code` is only used when the key has no row yet; an existing row
    /// keeps the prefix it was created or seeded with.
    pub async fn next_document_number(
        &self,
        certificate_type: CertificateType,
        year: i32,
        prefix_code: &str,
    ) -> Result<String, AllocationError> {
        let mut tx = self
            .pool
            .sqlite()
            .begin()
            .await
            .map_err(anyhow::Error::from)?;

        let allocated = self
            .allocate(&mut tx, certificate_type, year, prefix_code)
            .await?;

        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(allocated.document_number())
    }

    /// Reserve the next number on `conn`. The number is only consumed if the
    /// surrounding transaction commits.
    pub async fn allocate(
        &self,
        conn: &mut SqliteConnection,
        certificate_type: CertificateType,
        year: i32,
        prefix_code: &str,
    ) -> Result<AllocatedNumber, AllocationError> {
        let allocated = self
            .sequence_repo
            .next_number(conn, certificate_type, year, prefix_code)
            .await?;

        tracing::debug!(
            certificate_type = %certificate_type,
            year,
            number = allocated.number,
            "Document number reserved"
        );

        Ok(allocated)
    }

    /// Create or re-prefix the counter for (type, year) without moving it
    pub async fn seed(
        &self,
        certificate_type: CertificateType,
        year: i32,
        prefix_code: &str,
    ) -> Result<DocumentSequence, AllocationError> {
        Ok(self
            .sequence_repo
            .seed(certificate_type, year, prefix_code)
            .await?)
    }

    pub async fn list(&self) -> Result<Vec<DocumentSequence>, AllocationError> {
        Ok(self.sequence_repo.list().await?)
    }
}

//! Certificate service
//!
//! Issues certificates with a server-allocated document number and serves the
//! dashboard's certificate and sequence views.
//!
//! Issuing is all-or-nothing: the number is reserved and the certificate row
//! written in one transaction. If the write fails, the counter rolls back with
//! it, so a number is never recorded without its certificate.

use std::sync::Arc;

use anyhow::Context;
use chrono::Datelike;

use crate::db::repositories::CertificateRepository;
use crate::db::DynDatabasePool;
use crate::models::{Certificate, CertificateType, CreateCertificateInput, DocumentSequence};
use crate::services::clock::DynClock;
use crate::services::document_sequence::{
    is_unique_violation, AllocationError, DocumentSequenceAllocator,
};

/// Earliest and latest year accepted for a sequence
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2000..=2999;

#[derive(Debug, thiserror::Error)]
pub enum CertificateServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("Certificate not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CertificateService {
    pool: DynDatabasePool,
    certificate_repo: Arc<dyn CertificateRepository>,
    allocator: Arc<DocumentSequenceAllocator>,
    clock: DynClock,
    default_prefix: String,
}

impl CertificateService {
    pub fn new(
        pool: DynDatabasePool,
        certificate_repo: Arc<dyn CertificateRepository>,
        allocator: Arc<DocumentSequenceAllocator>,
        clock: DynClock,
        default_prefix: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            certificate_repo,
            allocator,
            clock,
            default_prefix: default_prefix.into(),
        }
    }

    /// Issue a certificate for the current year.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if a required applicant field is blank
    /// - `Allocation` if the number could not be reserved or was already taken;
    ///   nothing is persisted in either case
    pub async fn issue(
        &self,
        input: CreateCertificateInput,
    ) -> Result<Certificate, CertificateServiceError> {
        validate_input(&input)?;
        let year = self.clock.now().year();

        let mut tx = self
            .pool
            .sqlite()
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let allocated = self
            .allocator
            .allocate(&mut tx, input.certificate_type, year, &self.default_prefix)
            .await?;

        let id = match self.certificate_repo.insert(&mut tx, &input, &allocated).await {
            Ok(id) => id,
            Err(e) if is_unique_violation(&e) => {
                tracing::error!(
                    document_number = %allocated.document_number(),
                    "Allocated document number already in use"
                );
                return Err(AllocationError::conflict(&allocated).into());
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await.context("Failed to commit certificate")?;

        tracing::info!(
            id,
            document_number = %allocated.document_number(),
            certificate_type = %allocated.certificate_type,
            "Certificate issued"
        );

        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<Certificate, CertificateServiceError> {
        self.certificate_repo
            .get_by_id(id)
            .await?
            .ok_or(CertificateServiceError::NotFound)
    }

    /// List certificates newest first; returns the page and the total count
    pub async fn list(
        &self,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Certificate>, i64), CertificateServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let certificates = self.certificate_repo.list(page, per_page).await?;
        let total = self.certificate_repo.count().await?;
        Ok((certificates, total))
    }

    pub async fn count(&self) -> Result<i64, CertificateServiceError> {
        Ok(self.certificate_repo.count().await?)
    }

    /// Delete a certificate. Its number is not reused.
    pub async fn delete(&self, id: i64) -> Result<(), CertificateServiceError> {
        if !self.certificate_repo.delete(id).await? {
            return Err(CertificateServiceError::NotFound);
        }
        tracing::info!(id, "Certificate deleted");
        Ok(())
    }

    pub async fn list_sequences(&self) -> Result<Vec<DocumentSequence>, CertificateServiceError> {
        Ok(self.allocator.list().await?)
    }

    /// Set the prefix for a (type, year) counter, creating it if needed
    pub async fn seed_sequence(
        &self,
        certificate_type: CertificateType,
        year: i32,
        prefix_code: &str,
    ) -> Result<DocumentSequence, CertificateServiceError> {
        let prefix_code = prefix_code.trim();
        if prefix_code.is_empty() || prefix_code.contains('/') {
            return Err(CertificateServiceError::ValidationError(
                "Prefix code must be non-empty and must not contain '/'".to_string(),
            ));
        }
        if !YEAR_RANGE.contains(&year) {
            return Err(CertificateServiceError::ValidationError(format!(
                "Year must be between {} and {}",
                YEAR_RANGE.start(),
                YEAR_RANGE.end()
            )));
        }

        let sequence = self
            .allocator
            .seed(certificate_type, year, prefix_code)
            .await?;
        tracing::info!(
            certificate_type = %certificate_type,
            year,
            prefix_code,
            "Document sequence seeded"
        );
        Ok(sequence)
    }
}

fn validate_input(input: &CreateCertificateInput) -> Result<(), CertificateServiceError> {
    let required = [
        ("applicantName", &input.applicant_name),
        ("placeOfBirth", &input.place_of_birth),
        ("dateOfBirth", &input.date_of_birth),
        ("address", &input.address),
        ("rtRwLetterNumber", &input.rt_rw_letter_number),
        ("rtRwLetterDate", &input.rt_rw_letter_date),
    ];

    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

    if !missing.is_empty() {
        return Err(CertificateServiceError::ValidationError(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::certificate::tests::sample_input;
    use crate::db::repositories::{SqlxCertificateRepository, SqlxDocumentSequenceRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    async fn setup() -> (DynDatabasePool, CertificateService, ManualClock) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap());
        let allocator = Arc::new(DocumentSequenceAllocator::new(
            pool.clone(),
            SqlxDocumentSequenceRepository::boxed(pool.clone()),
        ));
        let service = CertificateService::new(
            pool.clone(),
            SqlxCertificateRepository::boxed(pool.clone()),
            allocator,
            Arc::new(clock.clone()),
            "001",
        );
        (pool, service, clock)
    }

    async fn current_number(pool: &DynDatabasePool, t: CertificateType, year: i32) -> Option<i64> {
        sqlx::query_scalar(
            "SELECT current_number FROM document_sequences WHERE certificate_type = ? AND year = ?",
        )
        .bind(t.as_str())
        .bind(year)
        .fetch_optional(pool.sqlite())
        .await
        .expect("Failed to read sequence")
    }

    #[tokio::test]
    async fn test_issue_assigns_sequential_numbers() {
        let (_pool, service, _clock) = setup().await;

        let first = service
            .issue(sample_input(CertificateType::SuratKeteranganUsaha))
            .await
            .expect("Failed to issue");
        let second = service
            .issue(sample_input(CertificateType::SuratKeteranganUsaha))
            .await
            .expect("Failed to issue");
        let other_type = service
            .issue(sample_input(CertificateType::SuratKeteranganPengantar))
            .await
            .expect("Failed to issue");

        assert_eq!(first.document_number, "001/001/2024");
        assert_eq!(second.document_number, "001/002/2024");
        assert_eq!(other_type.document_number, "001/001/2024");
        assert_eq!(second.sequence_number, 2);
        assert_eq!(second.year, 2024);
    }

    #[tokio::test]
    async fn test_sequence_is_independent_of_row_ids() {
        let (_pool, service, _clock) = setup().await;

        for _ in 0..3 {
            service
                .issue(sample_input(CertificateType::SuratKeteranganUsaha))
                .await
                .unwrap();
        }
        let pengantar = service
            .issue(sample_input(CertificateType::SuratKeteranganPengantar))
            .await
            .unwrap();

        assert_eq!(pengantar.id, 4);
        assert_eq!(pengantar.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_types_in_same_year_issue_independently() {
        let (pool, service, _clock) = setup().await;
        let order = [
            CertificateType::SuratKeteranganUsaha,
            CertificateType::SuratKeteranganPengantar,
            CertificateType::SuratKeteranganTidakMampu,
            CertificateType::SuratKeteranganPengantar,
            CertificateType::SuratKeteranganUsaha,
            CertificateType::SuratKeteranganPengantar,
        ];

        let mut issued = Vec::new();
        for t in order {
            let certificate = service
                .issue(sample_input(t))
                .await
                .expect("Failed to issue");
            issued.push((t, certificate.sequence_number));
        }

        assert_eq!(
            issued,
            vec![
                (CertificateType::SuratKeteranganUsaha, 1),
                (CertificateType::SuratKeteranganPengantar, 1),
                (CertificateType::SuratKeteranganTidakMampu, 1),
                (CertificateType::SuratKeteranganPengantar, 2),
                (CertificateType::SuratKeteranganUsaha, 2),
                (CertificateType::SuratKeteranganPengantar, 3),
            ]
        );
        assert_eq!(
            current_number(&pool, CertificateType::SuratKeteranganPengantar, 2024).await,
            Some(3)
        );
        assert_eq!(
            current_number(&pool, CertificateType::SuratKeteranganUsaha, 2024).await,
            Some(2)
        );
        assert_eq!(service.count().await.unwrap(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_issue_across_types() {
        const PER_TYPE: usize = 10;
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = crate::config::DatabaseConfig {
            url: dir.path().join("certificates.db").to_string_lossy().to_string(),
        };
        let pool = crate::db::create_pool(&config)
            .await
            .expect("Failed to create pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let allocator = Arc::new(DocumentSequenceAllocator::new(
            pool.clone(),
            SqlxDocumentSequenceRepository::boxed(pool.clone()),
        ));
        let service = Arc::new(CertificateService::new(
            pool.clone(),
            SqlxCertificateRepository::boxed(pool.clone()),
            allocator,
            Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap(),
            )),
            "001",
        ));

        let handles = CertificateType::ALL.into_iter().flat_map(|t| {
            let service = service.clone();
            (0..PER_TYPE).map(move |_| {
                let service = service.clone();
                tokio::spawn(async move { (t, service.issue(sample_input(t)).await) })
            })
        });

        let mut by_type: std::collections::HashMap<CertificateType, Vec<i64>> =
            std::collections::HashMap::new();
        for joined in futures::future::join_all(handles).await {
            let (t, result) = joined.expect("Task panicked");
            let certificate = result.expect("Failed to issue");
            by_type.entry(t).or_default().push(certificate.sequence_number);
        }

        let expected: Vec<i64> = (1..=PER_TYPE as i64).collect();
        for t in CertificateType::ALL {
            let mut numbers = by_type.remove(&t).unwrap_or_default();
            numbers.sort_unstable();
            assert_eq!(numbers, expected, "numbers for {} must be 1..={}", t, PER_TYPE);
        }
    }

    #[tokio::test]
    async fn test_new_year_restarts_numbering() {
        let (_pool, service, clock) = setup().await;
        service
            .issue(sample_input(CertificateType::SuratKeteranganUsaha))
            .await
            .unwrap();

        clock.set(Utc.with_ymd_and_hms(2025, 1, 2, 8, 0, 0).unwrap());
        let next_year = service
            .issue(sample_input(CertificateType::SuratKeteranganUsaha))
            .await
            .unwrap();

        assert_eq!(next_year.document_number, "001/001/2025");
    }

    #[tokio::test]
    async fn test_validation_failure_consumes_nothing() {
        let (pool, service, _clock) = setup().await;
        let mut input = sample_input(CertificateType::SuratKeteranganUsaha);
        input.applicant_name = "  ".to_string();

        let result = service.issue(input).await;

        assert!(matches!(result, Err(CertificateServiceError::ValidationError(_))));
        assert_eq!(
            current_number(&pool, CertificateType::SuratKeteranganUsaha, 2024).await,
            None
        );
    }

    #[tokio::test]
    async fn test_conflict_rolls_back_counter() {
        let (pool, service, _clock) = setup().await;

        // A row squatting on the next number makes the insert fail
        sqlx::query(
            r#"
            INSERT INTO certificates (document_number, certificate_type, year, sequence_number,
                applicant_name, place_of_birth, date_of_birth, address,
                rt_rw_letter_number, rt_rw_letter_date)
            VALUES ('001/001/2024', 'surat_keterangan_usaha', 2024, 1, 'x', 'x', 'x', 'x', 'x', 'x')
            "#,
        )
        .execute(pool.sqlite())
        .await
        .expect("Failed to insert squatter");

        let result = service
            .issue(sample_input(CertificateType::SuratKeteranganUsaha))
            .await;

        assert!(matches!(
            result,
            Err(CertificateServiceError::Allocation(AllocationError::Conflict {
                number: 1,
                year: 2024,
                ..
            }))
        ));
        assert_eq!(
            current_number(&pool, CertificateType::SuratKeteranganUsaha, 2024).await,
            None
        );
        assert_eq!(service.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_does_not_reuse_numbers() {
        let (_pool, service, _clock) = setup().await;
        let first = service
            .issue(sample_input(CertificateType::SuratKeteranganUsaha))
            .await
            .unwrap();

        service.delete(first.id).await.expect("Failed to delete");
        assert!(matches!(
            service.delete(first.id).await,
            Err(CertificateServiceError::NotFound)
        ));

        let next = service
            .issue(sample_input(CertificateType::SuratKeteranganUsaha))
            .await
            .unwrap();
        assert_eq!(next.document_number, "001/002/2024");
    }

    #[tokio::test]
    async fn test_seed_sequence() {
        let (_pool, service, _clock) = setup().await;

        let seeded = service
            .seed_sequence(CertificateType::SuratKeteranganTidakMampu, 2024, " 474 ")
            .await
            .expect("Failed to seed");
        assert_eq!(seeded.prefix_code, "474");
        assert_eq!(seeded.current_number, 0);

        let issued = service
            .issue(sample_input(CertificateType::SuratKeteranganTidakMampu))
            .await
            .unwrap();
        assert_eq!(issued.document_number, "474/001/2024");

        for (prefix, year) in [("", 2024), ("4/7", 2024), ("474", 1999)] {
            let result = service
                .seed_sequence(CertificateType::SuratKeteranganUsaha, year, prefix)
                .await;
            assert!(matches!(result, Err(CertificateServiceError::ValidationError(_))));
        }
    }

    #[tokio::test]
    async fn test_list_pages_and_total() {
        let (_pool, service, _clock) = setup().await;
        for _ in 0..3 {
            service
                .issue(sample_input(CertificateType::SuratKeteranganUsaha))
                .await
                .unwrap();
        }

        let (page, total) = service.list(1, 2).await.expect("Failed to list");

        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
    }
}

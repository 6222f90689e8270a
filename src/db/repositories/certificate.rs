//! Certificate repository
//!
//! Database operations for issued certificates. Inserts go through
//! `insert` on a caller-owned connection so the write can share a transaction
//! with the document number allocation.

use crate::db::DynDatabasePool;
use crate::models::{AllocatedNumber, Certificate, CertificateType, CreateCertificateInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const CERTIFICATE_COLUMNS: &str = "id, document_number, certificate_type, year, sequence_number, \
    applicant_name, place_of_birth, date_of_birth, occupation, address, business_name, \
    business_type, business_address, business_years, rt_rw_letter_number, rt_rw_letter_date, \
    gender, religion, purpose, nationality, family_card_number, national_id_number, \
    valid_from_date, remarks, created_at, updated_at";

/// Certificate repository trait
#[async_trait]
pub trait CertificateRepository: Send + Sync {
    /// Insert a certificate under an already allocated number, returning its ID
    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        input: &CreateCertificateInput,
        allocated: &AllocatedNumber,
    ) -> Result<i64>;

    /// Get certificate by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Certificate>>;

    /// List certificates, newest first
    async fn list(&self, page: i64, per_page: i64) -> Result<Vec<Certificate>>;

    /// Count all certificates
    async fn count(&self) -> Result<i64>;

    /// Delete a certificate; returns whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based certificate repository implementation
pub struct SqlxCertificateRepository {
    pool: DynDatabasePool,
}

impl SqlxCertificateRepository {
    /// Create a new SQLx certificate repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CertificateRepository> {
        Arc::new(Self::new(pool))
    }

    fn sqlite(&self) -> &SqlitePool {
        self.pool.sqlite()
    }
}

#[async_trait]
impl CertificateRepository for SqlxCertificateRepository {
    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        input: &CreateCertificateInput,
        allocated: &AllocatedNumber,
    ) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO certificates (
                document_number, certificate_type, year, sequence_number,
                applicant_name, place_of_birth, date_of_birth, occupation, address,
                business_name, business_type, business_address, business_years,
                rt_rw_letter_number, rt_rw_letter_date, gender, religion, purpose,
                nationality, family_card_number, national_id_number, valid_from_date,
                remarks, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(allocated.document_number())
        .bind(allocated.certificate_type.as_str())
        .bind(allocated.year)
        .bind(allocated.number)
        .bind(&input.applicant_name)
        .bind(&input.place_of_birth)
        .bind(&input.date_of_birth)
        .bind(input.occupation.as_deref().unwrap_or_default())
        .bind(&input.address)
        .bind(&input.business_name)
        .bind(&input.business_type)
        .bind(&input.business_address)
        .bind(&input.business_years)
        .bind(&input.rt_rw_letter_number)
        .bind(&input.rt_rw_letter_date)
        .bind(&input.gender)
        .bind(&input.religion)
        .bind(&input.purpose)
        .bind(&input.nationality)
        .bind(&input.family_card_number)
        .bind(&input.national_id_number)
        .bind(&input.valid_from_date)
        .bind(&input.remarks)
        .bind(now)
        .bind(now)
        .execute(conn)
        .await
        .with_context(|| format!("Failed to insert certificate {}", allocated.document_number()))?;

        Ok(result.last_insert_rowid())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Certificate>> {
        let sql = format!("SELECT {} FROM certificates WHERE id = ?", CERTIFICATE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.sqlite())
            .await
            .context("Failed to get certificate by ID")?;

        row.as_ref().map(row_to_certificate).transpose()
    }

    async fn list(&self, page: i64, per_page: i64) -> Result<Vec<Certificate>> {
        let offset = (page - 1).max(0) * per_page;
        let sql = format!(
            "SELECT {} FROM certificates ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            CERTIFICATE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(per_page)
            .bind(offset)
            .fetch_all(self.sqlite())
            .await
            .context("Failed to list certificates")?;

        rows.iter().map(row_to_certificate).collect()
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM certificates")
            .fetch_one(self.sqlite())
            .await
            .context("Failed to count certificates")?;

        Ok(row.get("count"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM certificates WHERE id = ?")
            .bind(id)
            .execute(self.sqlite())
            .await
            .context("Failed to delete certificate")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_certificate(row: &sqlx::sqlite::SqliteRow) -> Result<Certificate> {
    let type_str: String = row.get("certificate_type");
    let certificate_type = CertificateType::from_str(&type_str)
        .with_context(|| format!("Invalid certificate type in database: {}", type_str))?;

    Ok(Certificate {
        id: row.get("id"),
        document_number: row.get("document_number"),
        certificate_type,
        year: row.get("year"),
        sequence_number: row.get("sequence_number"),
        applicant_name: row.get("applicant_name"),
        place_of_birth: row.get("place_of_birth"),
        date_of_birth: row.get("date_of_birth"),
        occupation: row.get("occupation"),
        address: row.get("address"),
        business_name: row.get("business_name"),
        business_type: row.get("business_type"),
        business_address: row.get("business_address"),
        business_years: row.get("business_years"),
        rt_rw_letter_number: row.get("rt_rw_letter_number"),
        rt_rw_letter_date: row.get("rt_rw_letter_date"),
        gender: row.get("gender"),
        religion: row.get("religion"),
        purpose: row.get("purpose"),
        nationality: row.get("nationality"),
        family_card_number: row.get("family_card_number"),
        national_id_number: row.get("national_id_number"),
        valid_from_date: row.get("valid_from_date"),
        remarks: row.get("remarks"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

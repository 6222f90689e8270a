//! Certificate model
//!
//! Civil certificates (surat keterangan) issued by the village office. Every
//! certificate carries a document number allocated from its (type, year)
//! sequence at issue time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of certificate; each kind has its own yearly numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateType {
    /// Business statement letter
    SuratKeteranganUsaha,
    /// Statement of low income
    SuratKeteranganTidakMampu,
    /// Cover/introduction letter
    SuratKeteranganPengantar,
}

impl CertificateType {
    /// All known certificate types
    pub const ALL: [CertificateType; 3] = [
        CertificateType::SuratKeteranganUsaha,
        CertificateType::SuratKeteranganTidakMampu,
        CertificateType::SuratKeteranganPengantar,
    ];

    /// Storage / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateType::SuratKeteranganUsaha => "surat_keterangan_usaha",
            CertificateType::SuratKeteranganTidakMampu => "surat_keterangan_tidak_mampu",
            CertificateType::SuratKeteranganPengantar => "surat_keterangan_pengantar",
        }
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid certificate type: {}", s))
    }
}

/// Issued certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,
    pub document_number: String,
    pub certificate_type: CertificateType,
    pub year: i32,
    pub sequence_number: i64,
    pub applicant_name: String,
    pub place_of_birth: String,
    pub date_of_birth: String,
    pub occupation: String,
    pub address: String,
    pub business_name: Option<String>,
    pub business_type: Option<String>,
    pub business_address: Option<String>,
    pub business_years: Option<String>,
    pub rt_rw_letter_number: String,
    pub rt_rw_letter_date: String,
    pub gender: Option<String>,
    pub religion: Option<String>,
    pub purpose: Option<String>,
    pub nationality: Option<String>,
    pub family_card_number: Option<String>,
    pub national_id_number: Option<String>,
    pub valid_from_date: Option<String>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Applicant data submitted for a new certificate.
///
/// The document number is not part of the input; it is allocated when the
/// certificate is issued.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificateInput {
    pub certificate_type: CertificateType,
    pub applicant_name: String,
    pub place_of_birth: String,
    pub date_of_birth: String,
    #[serde(default)]
    pub occupation: Option<String>,
    pub address: String,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub business_type: Option<String>,
    #[serde(default)]
    pub business_address: Option<String>,
    #[serde(default)]
    pub business_years: Option<String>,
    pub rt_rw_letter_number: String,
    pub rt_rw_letter_date: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub religion: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub family_card_number: Option<String>,
    #[serde(default)]
    pub national_id_number: Option<String>,
    #[serde(default)]
    pub valid_from_date: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

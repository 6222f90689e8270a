//! Document sequence model
//!
//! One counter per (certificate type, year). The counter holds the last number
//! handed out for that key; the next certificate gets `current_number + 1`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CertificateType;

/// Persisted counter state for one (certificate type, year) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSequence {
    pub certificate_type: CertificateType,
    pub year: i32,
    /// Last issued number (0 when seeded but unused)
    pub current_number: i64,
    pub prefix_code: String,
    pub updated_at: DateTime<Utc>,
}

/// A number reserved from a sequence, together with the prefix it was issued under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedNumber {
    pub certificate_type: CertificateType,
    pub year: i32,
    pub number: i64,
    pub prefix_code: String,
}

impl AllocatedNumber {
    /// Human-readable document number, e.g. `001/007/2024`
    pub fn document_number(&self) -> String {
        format_document_number(&self.prefix_code, self.number, self.year)
    }
}

/// Format `{prefix}/{number}/{year}` with the number padded to three digits
pub fn format_document_number(prefix_code: &str, number: i64, year: i32) -> String {
    format!("{}/{:03}/{}", prefix_code, number, year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_document_number() {
        assert_eq!(format_document_number("001", 1, 2024), "001/001/2024");
        assert_eq!(format_document_number("470", 42, 2025), "470/042/2025");
        assert_eq!(format_document_number("470", 1234, 2025), "470/1234/2025");
    }

    #[test]
    fn test_allocated_number_document_number() {
        let allocated = AllocatedNumber {
            certificate_type: CertificateType::SuratKeteranganUsaha,
            year: 2024,
            number: 3,
            prefix_code: "001".to_string(),
        };
        assert_eq!(allocated.document_number(), "001/003/2024");
    }
}

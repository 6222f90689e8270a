//! Shared API response types
//!
//! Response structures used by more than one endpoint.

use serde::{Deserialize, Serialize};

use crate::models::{Certificate, DocumentSequence, User};

// ============================================================================
// User Response Types
// ============================================================================

/// Public view of a user; never carries the password hash
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role: user.role.to_string(),
            is_active: user.is_active,
            last_login: user.last_login.map(|t| t.to_rfc3339()),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Certificate Response Types
// ============================================================================

/// Row in the dashboard certificate listing
#[derive(Debug, Serialize, Deserialize)]
pub struct CertificateSummary {
    pub id: i64,
    pub document_number: String,
    pub certificate_type: String,
    pub applicant_name: String,
    pub created_at: String,
}

impl From<Certificate> for CertificateSummary {
    fn from(c: Certificate) -> Self {
        Self {
            id: c.id,
            document_number: c.document_number,
            certificate_type: c.certificate_type.to_string(),
            applicant_name: c.applicant_name,
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

/// Paginated certificate list
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedCertificatesResponse {
    pub items: Vec<CertificateSummary>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginatedCertificatesResponse {
    pub fn new(certificates: Vec<Certificate>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };
        Self {
            items: certificates.into_iter().map(Into::into).collect(),
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

// ============================================================================
// Sequence Response Types
// ============================================================================

/// Counter state for one (type, year) key
#[derive(Debug, Serialize, Deserialize)]
pub struct SequenceResponse {
    pub certificate_type: String,
    pub year: i32,
    pub current_number: i64,
    pub prefix_code: String,
    pub updated_at: String,
}

impl From<DocumentSequence> for SequenceResponse {
    fn from(s: DocumentSequence) -> Self {
        Self {
            certificate_type: s.certificate_type.to_string(),
            year: s.year,
            current_number: s.current_number,
            prefix_code: s.prefix_code,
            updated_at: s.updated_at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        let response = PaginatedCertificatesResponse::new(Vec::new(), 41, 1, 20);
        assert_eq!(response.total_pages, 3);

        let empty = PaginatedCertificatesResponse::new(Vec::new(), 0, 1, 20);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_user_response_omits_password_hash() {
        let user = User::new(
            "kades".to_string(),
            "kades@dermolo.desa.id".to_string(),
            "$argon2id$secret".to_string(),
            "Kepala Desa".to_string(),
            crate::models::UserRole::Admin,
        );

        let json = serde_json::to_string(&UserResponse::from(user)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"admin\""));
    }
}

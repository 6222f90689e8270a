//! Certificate ingestion API
//!
//! - POST /api/certificates - Issue a certificate submitted by the public form
//!
//! Callers authenticate with a shared secret sent as `Authorization: Bearer <token>`.
//! A missing header is 401; a wrong token, or no token configured on the
//! server, is 403. The document number is always allocated here, never
//! taken from the request.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::CreateCertificateInput;

/// Response for an issued certificate
#[derive(Debug, Serialize)]
pub struct IssueCertificateResponse {
    pub message: String,
    pub id: i64,
    pub document_number: String,
}

/// Build the ingestion router
pub fn router() -> Router<AppState> {
    Router::new().route("/api/certificates", post(issue_certificate))
}

/// Read the token from an `Authorization: Bearer` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Compare two secrets without short-circuiting on the first differing byte
fn tokens_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Check the bearer token against the configured shared secret
fn authorize_ingestion(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(given) = extract_bearer_token(headers) else {
        return Err(ApiError::unauthorized("Missing bearer token"));
    };

    let Some(expected) = state.config.certificates.api_token.as_deref() else {
        tracing::warn!("Certificate ingestion rejected: no API token configured");
        return Err(ApiError::forbidden("Certificate ingestion is disabled"));
    };

    if !tokens_match(given, expected) {
        tracing::warn!("Certificate ingestion rejected: invalid token");
        return Err(ApiError::forbidden("Invalid API token"));
    }

    Ok(())
}

/// POST /api/certificates
///
/// The token is checked before the body is looked at, so unauthenticated
/// callers never learn anything about validation.
async fn issue_certificate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateCertificateInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_ingestion(&state, &headers)?;

    let Json(input) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;

    let certificate = state.certificate_service.issue(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(IssueCertificateResponse {
            message: "Certificate issued".to_string(),
            id: certificate.id,
            document_number: certificate.document_number,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(authorization).unwrap(),
        );
        headers
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(&headers("Bearer s3cret")), Some("s3cret"));
        assert_eq!(extract_bearer_token(&headers("Basic s3cret")), None);
        assert_eq!(extract_bearer_token(&headers("Bearer ")), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3creT"));
        assert!(!tokens_match("s3cre", "s3cret"));
        assert!(!tokens_match("", "s3cret"));
    }
}

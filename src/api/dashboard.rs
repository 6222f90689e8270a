//! Dashboard API endpoints
//!
//! Admin-only; the session gate redirects everyone else before these run.
//! - GET /dashboard - Summary for the signed-in administrator
//! - GET /dashboard/certificates - Paginated certificate list
//! - GET /dashboard/certificates/{id} - Certificate detail
//! - DELETE /dashboard/certificates/{id} - Delete a certificate
//! - GET /dashboard/sequences - Document number counters
//! - PUT /dashboard/sequences - Set the prefix for a (type, year) counter

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{PaginatedCertificatesResponse, SequenceResponse, UserResponse};
use crate::models::{Certificate, CertificateType};

/// Response for the dashboard landing page
#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub user: UserResponse,
    pub certificate_count: i64,
    pub sequences: Vec<SequenceResponse>,
}

/// Request body for seeding a sequence
#[derive(Debug, Deserialize)]
pub struct SeedSequenceRequest {
    pub certificate_type: CertificateType,
    pub year: i32,
    pub prefix_code: String,
}

/// Build the dashboard router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(summary))
        .route("/dashboard/certificates", get(list_certificates))
        .route(
            "/dashboard/certificates/{id}",
            get(get_certificate).delete(delete_certificate),
        )
        .route(
            "/dashboard/sequences",
            get(list_sequences).put(seed_sequence),
        )
}

/// GET /dashboard
async fn summary(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<DashboardSummary>, ApiError> {
    let certificate_count = state.certificate_service.count().await?;
    let sequences = state.certificate_service.list_sequences().await?;

    Ok(Json(DashboardSummary {
        user: user.into(),
        certificate_count,
        sequences: sequences.into_iter().map(Into::into).collect(),
    }))
}

/// GET /dashboard/certificates
async fn list_certificates(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PaginatedCertificatesResponse>, ApiError> {
    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 100);
    let (certificates, total) = state.certificate_service.list(page, per_page).await?;

    Ok(Json(PaginatedCertificatesResponse::new(
        certificates,
        total,
        page,
        per_page,
    )))
}

/// GET /dashboard/certificates/{id}
async fn get_certificate(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Certificate>, ApiError> {
    Ok(Json(state.certificate_service.get(id).await?))
}

/// DELETE /dashboard/certificates/{id}
async fn delete_certificate(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.certificate_service.delete(id).await?;
    tracing::info!(id, user_id = user.id, "Certificate deleted from dashboard");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /dashboard/sequences
async fn list_sequences(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<SequenceResponse>>, ApiError> {
    let sequences = state.certificate_service.list_sequences().await?;
    Ok(Json(sequences.into_iter().map(Into::into).collect()))
}

/// PUT /dashboard/sequences
///
/// Creates the counter at zero if it does not exist; an existing counter
/// keeps its current number.
async fn seed_sequence(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(body): Json<SeedSequenceRequest>,
) -> Result<Json<SequenceResponse>, ApiError> {
    let sequence = state
        .certificate_service
        .seed_sequence(body.certificate_type, body.year, &body.prefix_code)
        .await?;
    Ok(Json(sequence.into()))
}

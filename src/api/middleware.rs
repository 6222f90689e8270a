//! API middleware
//!
//! Contains:
//! - `AppState`, the shared services handed to every handler
//! - `ApiError`, the JSON error body
//! - The session gate, run on every request
//! - `require_auth` for JSON endpoints that need a signed-in user

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxCertificateRepository, SqlxDocumentSequenceRepository, SqlxSessionRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{token_prefix, User};
use crate::services::certificate::{CertificateService, CertificateServiceError};
use crate::services::clock::DynClock;
use crate::services::document_sequence::{AllocationError, DocumentSequenceAllocator};
use crate::services::gate::{authorize, GateDecision};
use crate::services::session::SessionManager;
use crate::services::user::{UserService, UserServiceError};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session_token";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub user_service: Arc<UserService>,
    pub certificate_service: Arc<CertificateService>,
}

impl AppState {
    /// Wire repositories and services over `pool`
    pub fn new(pool: DynDatabasePool, config: Config, clock: DynClock) -> Self {
        let sessions = Arc::new(SessionManager::new(
            SqlxSessionRepository::boxed(pool.clone()),
            clock.clone(),
        ));
        let user_service = Arc::new(UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            sessions.clone(),
            config.session.lifetime(),
        ));
        let allocator = Arc::new(DocumentSequenceAllocator::new(
            pool.clone(),
            SqlxDocumentSequenceRepository::boxed(pool.clone()),
        ));
        let certificate_service = Arc::new(CertificateService::new(
            pool.clone(),
            SqlxCertificateRepository::boxed(pool),
            allocator,
            clock,
            config.certificates.prefix_code.clone(),
        ));

        Self {
            config: Arc::new(config),
            sessions,
            user_service,
            certificate_service,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Session token the current user authenticated with
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" | "ALLOCATION_CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound => ApiError::not_found("User not found"),
            UserServiceError::Session(e) => {
                tracing::error!("Session storage failed: {:#}", e);
                ApiError::internal_error("Session storage failed")
            }
            UserServiceError::InternalError(e) => {
                tracing::error!("User service failed: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<CertificateServiceError> for ApiError {
    fn from(e: CertificateServiceError) -> Self {
        match e {
            CertificateServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CertificateServiceError::NotFound => ApiError::not_found("Certificate not found"),
            CertificateServiceError::Allocation(AllocationError::Conflict {
                certificate_type,
                year,
                number,
            }) => ApiError::with_details(
                "ALLOCATION_CONFLICT",
                "Document number already in use",
                serde_json::json!({
                    "certificate_type": certificate_type,
                    "year": year,
                    "number": number,
                }),
            ),
            CertificateServiceError::Allocation(AllocationError::Persistence(e)) => {
                tracing::error!("Document number allocation failed: {:#}", e);
                ApiError::internal_error("Could not allocate a document number")
            }
            CertificateServiceError::InternalError(e) => {
                tracing::error!("Certificate service failed: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// Read the session token from the `session_token` cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value carrying a fresh session token
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        SESSION_COOKIE,
        token,
        max_age_secs.max(0),
        if secure { "; Secure" } else { "" }
    )
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Session gate, run on every request.
///
/// Resolves the cookie to a user, asks the authorization gate for a decision
/// and either forwards the request (with `AuthenticatedUser` and `SessionToken`
/// extensions) or redirects. A cookie that no longer resolves to a user is
/// cleared on the response. Storage failures while resolving are logged and
/// the request is treated as anonymous.
pub async fn session_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_session_token(request.headers());

    let mut stale_cookie = false;
    let user = match token.as_deref() {
        None => None,
        Some(token) => match state.sessions.resolve_current_user(token).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                stale_cookie = true;
                None
            }
            Err(e) => {
                tracing::error!(
                    session = token_prefix(token),
                    "Session resolution failed: {:#}",
                    e
                );
                None
            }
        },
    };

    let path = request.uri().path().to_string();
    let mut response = match authorize(&path, user.as_ref()) {
        GateDecision::Allow => {
            if let (Some(user), Some(token)) = (user, token) {
                request.extensions_mut().insert(AuthenticatedUser(user));
                request.extensions_mut().insert(SessionToken(token));
            }
            next.run(request).await
        }
        GateDecision::RedirectTo(target) => {
            tracing::debug!(path = %path, target, "Request redirected by gate");
            Redirect::temporary(target).into_response()
        }
    };

    // A handler that issued or cleared the cookie itself has the last word
    if stale_cookie && !sets_session_cookie(response.headers()) {
        let clear = clear_session_cookie(state.config.session.secure_cookie);
        if let Ok(value) = HeaderValue::from_str(&clear) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

/// Whether `headers` already carry a `Set-Cookie` for the session cookie
fn sets_session_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|cookie| {
            cookie
                .split_once('=')
                .is_some_and(|(name, _)| name.trim() == SESSION_COOKIE)
        })
}

/// Reject requests that the gate did not attach a user to
pub async fn require_auth(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return Err(ApiError::unauthorized("Authentication required"));
    }
    Ok(next.run(request).await)
}

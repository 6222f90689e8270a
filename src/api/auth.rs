//! Authentication API endpoints
//!
//! Handles HTTP requests for accounts and sessions:
//! - POST /api/auth/signup - Create an account and sign in
//! - POST /api/auth/login - Sign in with username or email
//! - POST /api/auth/logout - Sign out
//! - GET /api/auth/me - Get current user
//! - PUT /api/auth/profile - Update name, email or username
//! - PUT /api/auth/password - Change password
//!
//! The session token travels only in the `session_token` cookie; it is never
//! part of a response body.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    clear_session_cookie, extract_session_token, require_auth, session_cookie, ApiError,
    AppState, AuthenticatedUser, SessionToken,
};
use crate::api::responses::UserResponse;
use crate::models::{Session, UpdateProfileInput};
use crate::services::user::{LoginInput, SignupInput};

/// Request body for signup
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "username")]
    pub username_or_email: String,
    pub password: String,
}

/// Request body for profile updates; absent fields are left unchanged
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
}

/// Request body for password change
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub expires_at: i64,
}

/// Response for password change
#[derive(Debug, Serialize)]
pub struct ChangePasswordResponse {
    pub message: String,
    pub revoked_sessions: u64,
}

/// Build the auth router, mounted at `/api/auth`
pub fn router() -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(get_current_user))
        .route("/profile", put(update_profile))
        .route("/password", put(change_password))
        .route_layer(axum_middleware::from_fn(require_auth));

    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .merge(protected)
}

/// `Set-Cookie` header for a freshly created session
fn session_headers(state: &AppState, session: &Session) -> HeaderMap {
    let max_age = session.expires_at.seconds_until(state.sessions.now());
    let cookie = session_cookie(&session.id, max_age, state.config.session.secure_cookie);

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

/// POST /api/auth/signup
async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state
        .user_service
        .signup(SignupInput {
            full_name: body.full_name,
            username: body.username,
            email: body.email,
            password: body.password,
        })
        .await?;

    let headers = session_headers(&state, &session);
    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            user: user.into(),
            expires_at: session.expires_at.as_secs(),
        }),
    ))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state
        .user_service
        .login(LoginInput::new(body.username_or_email, body.password))
        .await?;

    let headers = session_headers(&state, &session);
    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            expires_at: session.expires_at.as_secs(),
        }),
    ))
}

/// POST /api/auth/logout
///
/// Always clears the cookie, whether or not it named a live session.
async fn logout(
    State(state): State<AppState>,
    request_headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = extract_session_token(&request_headers) {
        state.user_service.logout(&token).await?;
    }

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&clear_session_cookie(
        state.config.session.secure_cookie,
    )) {
        headers.insert(header::SET_COOKIE, value);
    }

    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/auth/me
async fn get_current_user(
    AuthenticatedUser(user): AuthenticatedUser,
) -> Json<UserResponse> {
    Json(user.into())
}

/// PUT /api/auth/profile
async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state
        .user_service
        .update_profile(
            user.id,
            UpdateProfileInput {
                full_name: body.full_name,
                email: body.email,
                username: body.username,
            },
        )
        .await?;

    Ok(Json(updated.into()))
}

/// PUT /api/auth/password
///
/// Signs out every other session of the user.
async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    SessionToken(token): SessionToken,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<ChangePasswordResponse>, ApiError> {
    let revoked_sessions = state
        .user_service
        .change_password(user.id, &token, &body.current_password, &body.new_password)
        .await?;

    Ok(Json(ChangePasswordResponse {
        message: "Password changed".to_string(),
        revoked_sessions,
    }))
}

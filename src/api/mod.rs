//! API layer - HTTP handlers and routing
//!
//! This module contains the HTTP surface of the Dermolo backend:
//! - Session gate middleware (runs on every request)
//! - Auth API endpoints
//! - Certificate ingestion endpoint
//! - Dashboard API endpoints (admin only)

pub mod auth;
pub mod certificates;
pub mod common;
pub mod dashboard;
pub mod middleware;
pub mod responses;

use axum::{middleware as axum_middleware, Router};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser, SESSION_COOKIE};

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/auth", auth::router())
        .merge(certificates::router())
        .merge(dashboard::router())
        .fallback(not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::session_gate,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

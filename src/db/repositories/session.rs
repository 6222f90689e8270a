//! Session repository
//!
//! Database operations for login sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite
//!
//! Sessions are only inserted and deleted, never updated.

use crate::db::DynDatabasePool;
use crate::models::{Session, UnixSeconds, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use super::user::row_to_user;

/// A session row joined with its owner
#[derive(Debug, Clone)]
pub struct SessionWithUser {
    pub session: Session,
    pub user: User,
}

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Look up a session by token together with its user, in one query
    async fn get_with_user(&self, token: &str) -> Result<Option<SessionWithUser>>;

    /// Delete a session; deleting an unknown token is not an error
    async fn delete(&self, token: &str) -> Result<()>;

    /// Delete all sessions for a user except `keep_token`
    async fn delete_by_user_except(&self, user_id: i64, keep_token: &str) -> Result<u64>;

    /// Delete sessions with `expires_at <= now`
    async fn delete_expired(&self, now: UnixSeconds) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }

    fn sqlite(&self) -> &SqlitePool {
        self.pool.sqlite()
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions (id, user_id, expires_at, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(self.sqlite())
        .await
        .context("Failed to create session")?;

        Ok(session.clone())
    }

    async fn get_with_user(&self, token: &str) -> Result<Option<SessionWithUser>> {
        let row = sqlx::query(
            r#"
            SELECT s.id AS session_id, s.expires_at, s.created_at AS session_created_at,
                   u.id, u.username, u.email, u.password_hash, u.full_name, u.role,
                   u.is_active, u.email_verified, u.last_login, u.created_at, u.updated_at
            FROM user_sessions s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.id = ?
            "#,
        )
        .bind(token)
        .fetch_optional(self.sqlite())
        .await
        .context("Failed to get session")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user = row_to_user(&row)?;
        let session = Session {
            id: row.get("session_id"),
            user_id: user.id,
            expires_at: row.get("expires_at"),
            created_at: row.get("session_created_at"),
        };

        Ok(Some(SessionWithUser { session, user }))
    }

    async fn delete(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_sessions WHERE id = ?")
            .bind(token)
            .execute(self.sqlite())
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    async fn delete_by_user_except(&self, user_id: i64, keep_token: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = ? AND id <> ?")
            .bind(user_id)
            .bind(keep_token)
            .execute(self.sqlite())
            .await
            .context("Failed to revoke other sessions")?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: UnixSeconds) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(self.sqlite())
            .await
            .context("Failed to delete expired sessions")?;

        Ok(result.rows_affected())
    }
}

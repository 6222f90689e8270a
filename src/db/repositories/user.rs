//! User repository
//!
//! Database operations for user accounts.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite

use crate::db::DynDatabasePool;
use crate::models::{User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, role, is_active, \
                            email_verified, last_login, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Create a self-registered user. The role is promoted to admin when the
    /// table is empty at insert time.
    async fn create_signup(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update profile fields, role and activation flag
    async fn update(&self, user: &User) -> Result<User>;

    /// Replace the stored password hash
    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    /// Record a successful login
    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    fn sqlite(&self) -> &SqlitePool {
        self.pool.sqlite()
    }

    async fn get_by_column(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(self.sqlite())
            .await
            .with_context(|| format!("Failed to get user by {}", column))?;

        row.as_ref().map(row_to_user).transpose()
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, full_name, role, is_active,
                               email_verified, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.role.to_string())
        .bind(user.is_active)
        .bind(user.email_verified)
        .bind(now)
        .bind(now)
        .execute(self.sqlite())
        .await
        .context("Failed to create user")?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .context("Failed to retrieve created user")
    }

    async fn create_signup(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, full_name, role, is_active,
                               email_verified, created_at, updated_at)
            VALUES (?, ?, ?, ?,
                    CASE WHEN EXISTS (SELECT 1 FROM users) THEN ? ELSE 'admin' END,
                    ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.role.to_string())
        .bind(user.is_active)
        .bind(user.email_verified)
        .bind(now)
        .bind(now)
        .execute(self.sqlite())
        .await
        .context("Failed to create user")?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .context("Failed to retrieve created user")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.sqlite())
            .await
            .context("Failed to get user by ID")?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.get_by_column("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.get_by_column("email", email).await
    }

    async fn update(&self, user: &User) -> Result<User> {
        sqlx::query(
            r#"
            UPDATE users
            SET username = ?, email = ?, full_name = ?, role = ?, is_active = ?,
                email_verified = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role.to_string())
        .bind(user.is_active)
        .bind(user.email_verified)
        .bind(Utc::now())
        .bind(user.id)
        .execute(self.sqlite())
        .await
        .context("Failed to update user")?;

        self.get_by_id(user.id)
            .await?
            .context("Failed to retrieve updated user")
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(self.sqlite())
            .await
            .context("Failed to update password")?;

        Ok(())
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(self.sqlite())
            .await
            .context("Failed to record last login")?;

        Ok(())
    }
}

/// Map a `users` row; also used by the session join.
pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        role,
        is_active: row.get("is_active"),
        email_verified: row.get("email_verified"),
        last_login: row.get("last_login"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn create_test_user(username: &str, email: &str) -> User {
        User::new(
            username.to_string(),
            email.to_string(),
            "$argon2id$placeholder".to_string(),
            "Warga Dermolo".to_string(),
            UserRole::Staff,
        )
    }

    #[tokio::test]
    async fn test_create_signup_promotes_only_first_user() {
        let (_pool, repo) = setup_test_repo().await;

        let first = repo
            .create_signup(&create_test_user("kades", "kades@example.com"))
            .await
            .expect("Failed to create user");
        let second = repo
            .create_signup(&create_test_user("carik", "carik@example.com"))
            .await
            .expect("Failed to create user");

        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::Staff);
    }

    #[tokio::test]
    async fn test_create_user() {
        let (_pool, repo) = setup_test_repo().await;
        let user = create_test_user("testuser", "test@example.com");

        let created = repo.create(&user).await.expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.username, "testuser");
        assert_eq!(created.email, "test@example.com");
        assert_eq!(created.full_name, "Warga Dermolo");
        assert_eq!(created.role, UserRole::Staff);
        assert!(created.is_active);
        assert!(created.last_login.is_none());
    }

    #[tokio::test]
    async fn test_get_user_by_id_not_found() {
        let (_pool, repo) = setup_test_repo().await;

        let found = repo.get_by_id(999).await.expect("Failed to get user");

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_get_user_by_username_and_email() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&create_test_user("testuser", "test@example.com"))
            .await
            .expect("Failed to create user");

        let by_username = repo
            .get_by_username("testuser")
            .await
            .expect("Failed to get user")
            .expect("User not found");
        let by_email = repo
            .get_by_email("test@example.com")
            .await
            .expect("Failed to get user")
            .expect("User not found");

        assert_eq!(by_username.id, created.id);
        assert_eq!(by_email.id, created.id);
        assert!(repo.get_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_email_fails() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&create_test_user("first", "same@example.com"))
            .await
            .expect("Failed to create user");

        let result = repo
            .create(&create_test_user("second", "same@example.com"))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_update_user() {
        let (_pool, repo) = setup_test_repo().await;
        let mut user = repo
            .create(&create_test_user("testuser", "test@example.com"))
            .await
            .expect("Failed to create user");

        user.full_name = "Kepala Desa".to_string();
        user.role = UserRole::Official;
        user.is_active = false;

        let updated = repo.update(&user).await.expect("Failed to update user");

        assert_eq!(updated.full_name, "Kepala Desa");
        assert_eq!(updated.role, UserRole::Official);
        assert!(!updated.is_active);
    }

    #[tokio::test]
    async fn test_update_password_and_last_login() {
        let (_pool, repo) = setup_test_repo().await;
        let user = repo
            .create(&create_test_user("testuser", "test@example.com"))
            .await
            .expect("Failed to create user");

        repo.update_password(user.id, "new-hash")
            .await
            .expect("Failed to update password");
        let login_at = Utc::now();
        repo.touch_last_login(user.id, login_at)
            .await
            .expect("Failed to touch last login");

        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.password_hash, "new-hash");
        assert_eq!(
            found.last_login.map(|t| t.timestamp()),
            Some(login_at.timestamp())
        );
    }
}

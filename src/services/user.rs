//! User service
//!
//! Account operations for the office staff:
//! - Signup (the first account becomes admin)
//! - Login / logout
//! - Profile and password changes
//! - Expired session cleanup

use crate::db::repositories::UserRepository;
use crate::models::{Session, UpdateProfileInput, User, UserRole};
use crate::services::document_sequence::is_unique_violation;
use crate::services::password::{check_password_length, hash_password, verify_password};
use crate::services::session::{SessionError, SessionManager};
use anyhow::Context;
use chrono::Duration;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials or inactive account)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found")]
    NotFound,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for signup
#[derive(Debug, Clone)]
pub struct SignupInput {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Input for login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

/// User service for accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    sessions: Arc<SessionManager>,
    session_lifetime: Duration,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        sessions: Arc<SessionManager>,
        session_lifetime: Duration,
    ) -> Self {
        Self {
            user_repo,
            sessions,
            session_lifetime,
        }
    }

    /// Create an account and log it in.
    ///
    /// The first account in an empty database is made `admin`; later accounts
    /// get the `user` role and must be promoted by an administrator.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for empty fields, a malformed email or a short password
    /// - `UserExists` if the username or email is taken
    pub async fn signup(&self, input: SignupInput) -> Result<(User, Session), UserServiceError> {
        let input = SignupInput {
            full_name: input.full_name.trim().to_string(),
            username: input.username.trim().to_string(),
            email: input.email.trim().to_string(),
            password: input.password,
        };
        validate_signup_input(&input)?;

        self.ensure_username_free(&input.username, None).await?;
        self.ensure_email_free(&input.email, None).await?;

        let password_hash = hash_password(&input.password)?;
        let user = User::new(
            input.username,
            input.email,
            password_hash,
            input.full_name,
            UserRole::User,
        );
        let created = match self.user_repo.create_signup(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(
                    "Username or email is already taken".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let session = self.start_session(&created).await?;

        tracing::info!(
            user_id = created.id,
            username = %created.username,
            role = %created.role,
            "Account created"
        );

        Ok((created, session))
    }

    /// Log in with a username or email and a password.
    ///
    /// # Errors
    ///
    /// - `AuthenticationError` for unknown users, wrong passwords and inactive accounts
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let identifier = input.username_or_email.trim();
        if identifier.is_empty() || input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username/email and password are required".to_string(),
            ));
        }

        let Some(user) = self.find_user_by_username_or_email(identifier).await? else {
            tracing::warn!(identifier, "Login failed: unknown user");
            return Err(invalid_credentials());
        };

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            tracing::warn!(user_id = user.id, "Login failed: wrong password");
            return Err(invalid_credentials());
        }

        if !user.is_active {
            tracing::warn!(user_id = user.id, "Login refused: account inactive");
            return Err(UserServiceError::AuthenticationError(
                "Account is inactive. Please contact the administrator.".to_string(),
            ));
        }

        let now = self.sessions.now();
        let login_at = now.to_datetime().unwrap_or(user.updated_at);
        self.user_repo
            .touch_last_login(user.id, login_at)
            .await
            .context("Failed to record login")?;

        let session = self.start_session(&user).await?;
        tracing::info!(user_id = user.id, session = session.log_id(), "User logged in");

        let user = User {
            last_login: Some(login_at),
            ..user
        };
        Ok((user, session))
    }

    /// Invalidate a session token. Logging out twice is fine.
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.sessions.invalidate_session(token).await?;
        tracing::info!("User logged out");
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?
            .ok_or(UserServiceError::NotFound)
    }

    /// Update the caller's own name, email or username.
    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.get_by_id(user_id).await?;

        if let Some(full_name) = input.full_name {
            let full_name = full_name.trim();
            if full_name.is_empty() {
                return Err(UserServiceError::ValidationError(
                    "Full name cannot be empty".to_string(),
                ));
            }
            user.full_name = full_name.to_string();
        }

        if let Some(username) = input.username {
            let username = username.trim();
            if username.is_empty() {
                return Err(UserServiceError::ValidationError(
                    "Username cannot be empty".to_string(),
                ));
            }
            self.ensure_username_free(username, Some(user.id)).await?;
            user.username = username.to_string();
        }

        if let Some(email) = input.email {
            let email = email.trim();
            validate_email(email)?;
            self.ensure_email_free(email, Some(user.id)).await?;
            user.email = email.to_string();
        }

        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;
        tracing::info!(user_id = updated.id, "Profile updated");
        Ok(updated)
    }

    /// Change the password after checking the current one.
    ///
    /// Every other session of the user is revoked; `current_token` stays valid.
    /// Returns the number of revoked sessions.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<u64, UserServiceError> {
        let user = self.get_by_id(user_id).await?;

        let current_valid = verify_password(current_password, &user.password_hash)
            .context("Failed to verify password")?;
        if !current_valid {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }

        check_password_length(new_password).map_err(UserServiceError::ValidationError)?;

        let password_hash = hash_password(new_password)?;
        self.user_repo
            .update_password(user.id, &password_hash)
            .await
            .context("Failed to store new password")?;

        let revoked = self
            .sessions
            .revoke_other_sessions(user.id, current_token)
            .await?;
        tracing::info!(user_id = user.id, revoked, "Password changed");
        Ok(revoked)
    }

    /// Delete all expired sessions. Runs once at startup; there is no periodic sweep.
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let removed = self.sessions.delete_expired().await?;
        if removed > 0 {
            tracing::info!(removed, "Expired sessions removed");
        }
        Ok(removed)
    }

    async fn start_session(&self, user: &User) -> Result<Session, UserServiceError> {
        let expires_at = self.sessions.now() + self.session_lifetime;
        Ok(self.sessions.create_session(user.id, expires_at).await?)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        Ok(self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?)
    }

    async fn ensure_username_free(
        &self,
        username: &str,
        owner: Option<i64>,
    ) -> Result<(), UserServiceError> {
        let existing = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to check username")?;
        match existing {
            Some(other) if Some(other.id) != owner => Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                username
            ))),
            _ => Ok(()),
        }
    }

    async fn ensure_email_free(
        &self,
        email: &str,
        owner: Option<i64>,
    ) -> Result<(), UserServiceError> {
        let existing = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to check email")?;
        match existing {
            Some(other) if Some(other.id) != owner => Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            ))),
            _ => Ok(()),
        }
    }
}

fn invalid_credentials() -> UserServiceError {
    UserServiceError::AuthenticationError("Invalid username or password".to_string())
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if email.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Email cannot be empty".to_string(),
        ));
    }
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(())
}

fn validate_signup_input(input: &SignupInput) -> Result<(), UserServiceError> {
    if input.full_name.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Full name cannot be empty".to_string(),
        ));
    }
    if input.username.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }
    validate_email(&input.email)?;
    check_password_length(&input.password).map_err(UserServiceError::ValidationError)
}

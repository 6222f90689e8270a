//! User model
//!
//! This module defines the User entity and related types.
//! The session gate only reads `role` and `is_active`; everything else is profile data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity representing a registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name
    pub full_name: String,
    /// User role
    pub role: UserRole,
    /// Inactive accounts cannot log in and their sessions stop resolving
    pub is_active: bool,
    /// Whether the email address was verified
    pub email_verified: bool,
    /// Last successful login
    pub last_login: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// Note: The password should already be hashed before calling this function.
    /// Use `services::password::hash_password()` to hash the password.
    pub fn new(
        username: String,
        email: String,
        password_hash: String,
        full_name: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            username,
            email,
            password_hash,
            full_name,
            role,
            is_active: true,
            email_verified: false,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// User role for authorization.
///
/// Only `Admin` is granted the dashboard. `Official`, `Staff` and `User`
/// exist in stored data but currently carry no extra privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Administrator - dashboard access
    Admin,
    /// Village official
    Official,
    /// Office staff
    Staff,
    /// Regular account
    User,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::User
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Official => write!(f, "official"),
            UserRole::Staff => write!(f, "staff"),
            UserRole::User => write!(f, "user"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "official" => Ok(UserRole::Official),
            "staff" => Ok(UserRole::Staff),
            "user" => Ok(UserRole::User),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Input for updating profile fields of a user
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileInput {
    /// New display name (optional)
    pub full_name: Option<String>,
    /// New email (optional)
    pub email: Option<String>,
    /// New username (optional)
    pub username: Option<String>,
}

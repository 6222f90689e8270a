//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UnixSeconds;

/// Session entity for user authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session token (hex, also the primary key)
    pub id: String,
    /// Associated user ID
    pub user_id: i64,
    /// Expiration instant in seconds since epoch
    pub expires_at: UnixSeconds,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// A session is live at `now` only while `expires_at > now`
    pub fn is_expired_at(&self, now: UnixSeconds) -> bool {
        !self.expires_at.is_after(now)
    }

    /// Shortened token for log lines
    pub fn log_id(&self) -> &str {
        token_prefix(&self.id)
    }
}

/// First eight characters of a token, safe to log
pub fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_at(seconds: i64) -> Session {
        Session {
            id: "0123456789abcdef".to_string(),
            user_id: 1,
            expires_at: UnixSeconds::new(seconds),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_expiration_boundary() {
        let session = session_expiring_at(1_000);

        assert!(!session.is_expired_at(UnixSeconds::new(999)));
        assert!(session.is_expired_at(UnixSeconds::new(1_000)));
        assert!(session.is_expired_at(UnixSeconds::new(1_001)));
    }

    #[test]
    fn test_log_id_truncates() {
        assert_eq!(session_expiring_at(0).log_id(), "01234567");
        assert_eq!(token_prefix("abc"), "abc");
    }
}

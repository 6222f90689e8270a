//! Session manager
//!
//! Issues, resolves and revokes login sessions. A session is valid at instant
//! `now` only if its row exists, `expires_at > now`, and its owner is active.
//! Anything else resolves to "no user"; only storage failures are errors.

use std::sync::Arc;

use crate::db::repositories::SessionRepository;
use crate::models::{token_prefix, Session, UnixSeconds, User};
use crate::services::clock::DynClock;

/// Random bytes per token (256 bits)
pub const TOKEN_BYTES: usize = 32;

/// Length of a hex-encoded token
pub const TOKEN_LENGTH: usize = TOKEN_BYTES * 2;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Storage failed or the OS random source was unavailable
    #[error("Session storage error: {0}")]
    Persistence(#[from] anyhow::Error),
}

/// Generate a fresh session token: 32 bytes from the OS CSPRNG, hex encoded.
pub fn generate_token() -> Result<String, SessionError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::fill(&mut bytes)
        .map_err(|e| anyhow::anyhow!("Failed to read OS random source: {}", e))?;
    Ok(hex::encode(bytes))
}

/// Session lifecycle on top of the session repository
pub struct SessionManager {
    session_repo: Arc<dyn SessionRepository>,
    clock: DynClock,
}

impl SessionManager {
    pub fn new(session_repo: Arc<dyn SessionRepository>, clock: DynClock) -> Self {
        Self {
            session_repo,
            clock,
        }
    }

    /// Current time as seen by this manager
    pub fn now(&self) -> UnixSeconds {
        self.clock.now_seconds()
    }

    /// Persist a new session for `user_id` that expires at `expires_at`.
    pub async fn create_session(
        &self,
        user_id: i64,
        expires_at: UnixSeconds,
    ) -> Result<Session, SessionError> {
        let session = Session {
            id: generate_token()?,
            user_id,
            expires_at,
            created_at: self.clock.now(),
        };

        let created = self.session_repo.create(&session).await?;

        tracing::debug!(
            user_id,
            session = created.log_id(),
            expires_at = %created.expires_at,
            "Session created"
        );

        Ok(created)
    }

    /// Resolve the user behind a session token.
    ///
    /// Returns `Ok(None)` for unknown tokens, expired sessions (`expires_at <= now`)
    /// and inactive owners. Expired rows are removed on the way out.
    pub async fn resolve_current_user(&self, token: &str) -> Result<Option<User>, SessionError> {
        let Some(found) = self.session_repo.get_with_user(token).await? else {
            return Ok(None);
        };

        let now = self.now();
        if found.session.is_expired_at(now) {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!(
                    session = token_prefix(token),
                    "Failed to remove expired session: {:#}",
                    e
                );
            }
            return Ok(None);
        }

        if !found.user.is_active {
            tracing::debug!(user_id = found.user.id, "Session owner is inactive");
            return Ok(None);
        }

        Ok(Some(found.user))
    }

    /// Delete a session. Unknown tokens are ignored.
    pub async fn invalidate_session(&self, token: &str) -> Result<(), SessionError> {
        self.session_repo.delete(token).await?;
        tracing::debug!(session = token_prefix(token), "Session invalidated");
        Ok(())
    }

    /// Delete every session of `user_id` except `keep_token`
    pub async fn revoke_other_sessions(
        &self,
        user_id: i64,
        keep_token: &str,
    ) -> Result<u64, SessionError> {
        Ok(self
            .session_repo
            .delete_by_user_except(user_id, keep_token)
            .await?)
    }

    /// Delete every session already expired at the current instant
    pub async fn delete_expired(&self) -> Result<u64, SessionError> {
        Ok(self.session_repo.delete_expired(self.now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use crate::services::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use std::collections::HashSet;

    struct Fixture {
        manager: SessionManager,
        users: SqlxUserRepository,
        clock: ManualClock,
        user: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        let manager = SessionManager::new(
            SqlxSessionRepository::boxed(pool.clone()),
            Arc::new(clock.clone()),
        );
        let users = SqlxUserRepository::new(pool);
        let user = users
            .create(&User::new(
                "kades".to_string(),
                "kades@dermolo.desa.id".to_string(),
                "hash".to_string(),
                "Kepala Desa".to_string(),
                UserRole::Admin,
            ))
            .await
            .expect("Failed to create user");

        Fixture {
            manager,
            users,
            clock,
            user,
        }
    }

    #[test]
    fn test_generate_token_format() {
        let token = generate_token().expect("Failed to generate token");
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generate_token_distinct() {
        let tokens: HashSet<String> = (0..10_000)
            .map(|_| generate_token().expect("Failed to generate token"))
            .collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[tokio::test]
    async fn test_resolve_valid_session() {
        let f = setup().await;
        let session = f
            .manager
            .create_session(f.user.id, f.manager.now() + Duration::hours(1))
            .await
            .expect("Failed to create session");

        let resolved = f
            .manager
            .resolve_current_user(&session.id)
            .await
            .expect("Failed to resolve")
            .expect("Session should resolve");

        assert_eq!(resolved.id, f.user.id);
        assert_eq!(resolved.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn test_resolve_unknown_token() {
        let f = setup().await;
        let unknown = generate_token().unwrap();
        assert!(f.manager.resolve_current_user(&unknown).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_expired_by_one_second() {
        let f = setup().await;
        let expired_at = f.manager.now() + Duration::seconds(-1);
        let session = f.manager.create_session(f.user.id, expired_at).await.unwrap();

        assert!(f.manager.resolve_current_user(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_equal_to_now_is_expired() {
        let f = setup().await;
        let session = f
            .manager
            .create_session(f.user.id, f.manager.now())
            .await
            .unwrap();

        assert!(f.manager.resolve_current_user(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_owner_resolves_to_none() {
        let f = setup().await;
        let session = f
            .manager
            .create_session(f.user.id, f.manager.now() + Duration::days(7))
            .await
            .unwrap();

        let mut user = f.user.clone();
        user.is_active = false;
        f.users.update(&user).await.expect("Failed to deactivate");

        assert!(f.manager.resolve_current_user(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clock_advance_crosses_expiry() {
        let f = setup().await;
        let session = f
            .manager
            .create_session(f.user.id, f.manager.now() + Duration::seconds(600))
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(599));
        assert!(f.manager.resolve_current_user(&session.id).await.unwrap().is_some());

        f.clock.advance(Duration::seconds(2));
        assert!(f.manager.resolve_current_user(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clock_scenario_from_fixed_start() {
        let f = setup().await;
        let start = f.manager.now();
        let session = f
            .manager
            .create_session(f.user.id, start + Duration::seconds(601))
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(600));
        assert!(f.manager.resolve_current_user(&session.id).await.unwrap().is_some());

        f.clock.advance(Duration::seconds(1));
        assert!(f.manager.resolve_current_user(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_twice_then_absent() {
        let f = setup().await;
        let session = f
            .manager
            .create_session(f.user.id, f.manager.now() + Duration::days(7))
            .await
            .unwrap();

        f.manager.invalidate_session(&session.id).await.expect("First invalidate");
        f.manager.invalidate_session(&session.id).await.expect("Second invalidate");

        assert!(f.manager.resolve_current_user(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_other_sessions() {
        let f = setup().await;
        let expires = f.manager.now() + Duration::days(7);
        let keep = f.manager.create_session(f.user.id, expires).await.unwrap();
        let other = f.manager.create_session(f.user.id, expires).await.unwrap();

        let removed = f
            .manager
            .revoke_other_sessions(f.user.id, &keep.id)
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(f.manager.resolve_current_user(&keep.id).await.unwrap().is_some());
        assert!(f.manager.resolve_current_user(&other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_uses_clock() {
        let f = setup().await;
        f.manager
            .create_session(f.user.id, f.manager.now() + Duration::seconds(10))
            .await
            .unwrap();
        let live = f
            .manager
            .create_session(f.user.id, f.manager.now() + Duration::days(1))
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(10));

        assert_eq!(f.manager.delete_expired().await.unwrap(), 1);
        assert!(f.manager.resolve_current_user(&live.id).await.unwrap().is_some());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Any offset at or before now resolves to nothing; any offset after now resolves.
        #[test]
        fn property_expiry_boundary(offset in -3_600i64..3_600) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let f = setup().await;
                let session = f
                    .manager
                    .create_session(f.user.id, f.manager.now() + Duration::seconds(offset))
                    .await
                    .expect("Failed to create session");

                let resolved = f.manager.resolve_current_user(&session.id).await
                    .expect("Failed to resolve");
                prop_assert_eq!(resolved.is_some(), offset > 0);
                Ok(())
            });
            result?;
        }
    }
}

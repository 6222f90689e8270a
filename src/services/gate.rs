//! Authorization gate
//!
//! Path-based access policy evaluated on every request. The decision is a pure
//! function of the request path and the user resolved from the session cookie,
//! so it carries no state between requests.
//!
//! | caller                 | public path | auth page   | `/dashboard/**` | other      |
//! |------------------------|-------------|-------------|-----------------|------------|
//! | no session             | allow       | allow       | → login         | → login    |
//! | non-admin              | allow       | allow       | → login         | allow      |
//! | admin                  | allow       | → dashboard | allow           | allow      |

use crate::models::{User, UserRole};

/// Where unauthenticated and unauthorized requests are sent
pub const LOGIN_PATH: &str = "/login";

/// Administrative area, admin role only
pub const DASHBOARD_PATH: &str = "/dashboard";

/// Paths served to anyone; matched exactly or as a path-segment prefix.
/// `/` itself only matches exactly.
const PUBLIC_PATHS: &[&str] = &[
    "/login",
    "/signup",
    "/forgot-password",
    "/api/auth",
    "/api/certificates",
    "/_next",
    "/images",
    "/favicon.ico",
    "/robots.txt",
];

/// Pages an already signed-in admin is bounced away from
const AUTH_PAGES: &[&str] = &["/", "/login", "/signup", "/forgot-password"];

/// Outcome of the gate for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    RedirectTo(&'static str),
}

/// Decide whether `path` may be served to `user`.
pub fn authorize(path: &str, user: Option<&User>) -> GateDecision {
    let admin = user.filter(|u| u.role == UserRole::Admin && u.is_active);

    if admin.is_some() && AUTH_PAGES.contains(&path) {
        return GateDecision::RedirectTo(DASHBOARD_PATH);
    }

    if is_public_path(path) {
        return GateDecision::Allow;
    }

    let Some(user) = user else {
        return GateDecision::RedirectTo(LOGIN_PATH);
    };

    if is_under(path, DASHBOARD_PATH) && user.role != UserRole::Admin {
        return GateDecision::RedirectTo(LOGIN_PATH);
    }

    GateDecision::Allow
}

/// Whether `path` is on the public allow-list
pub fn is_public_path(path: &str) -> bool {
    path == "/" || PUBLIC_PATHS.iter().any(|prefix| is_under(path, prefix))
}

/// `path` equals `prefix` or continues it with a new segment
fn is_under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(role: UserRole) -> User {
        User::new(
            "pengguna".to_string(),
            "pengguna@dermolo.desa.id".to_string(),
            "hash".to_string(),
            "Pengguna".to_string(),
            role,
        )
    }

    #[test]
    fn test_documented_examples() {
        let admin = user(UserRole::Admin);
        let staff = user(UserRole::Staff);

        assert_eq!(authorize("/dashboard/x", Some(&admin)), GateDecision::Allow);
        assert_eq!(
            authorize("/dashboard/x", Some(&staff)),
            GateDecision::RedirectTo(LOGIN_PATH)
        );
        assert_eq!(
            authorize("/login", Some(&admin)),
            GateDecision::RedirectTo(DASHBOARD_PATH)
        );
        assert_eq!(authorize("/", None), GateDecision::Allow);
    }

    #[test]
    fn test_anonymous_requests() {
        assert_eq!(authorize("/login", None), GateDecision::Allow);
        assert_eq!(authorize("/_next/static/app.js", None), GateDecision::Allow);
        assert_eq!(authorize("/api/certificates", None), GateDecision::Allow);
        assert_eq!(authorize("/dashboard", None), GateDecision::RedirectTo(LOGIN_PATH));
        assert_eq!(authorize("/profile", None), GateDecision::RedirectTo(LOGIN_PATH));
    }

    #[test]
    fn test_root_is_not_a_prefix() {
        assert!(is_public_path("/"));
        assert!(!is_public_path("/dashboard"));
        assert!(!is_public_path("/settings"));
    }

    #[test]
    fn test_prefixes_respect_segment_boundaries() {
        assert!(is_public_path("/images/logo.png"));
        assert!(!is_public_path("/imagesets"));
        assert!(!is_public_path("/login-admin"));
        assert!(is_under("/dashboard", DASHBOARD_PATH));
        assert!(!is_under("/dashboards", DASHBOARD_PATH));
    }

    #[test]
    fn test_non_admin_roles_outside_dashboard() {
        for role in [UserRole::Official, UserRole::Staff, UserRole::User] {
            let u = user(role);
            assert_eq!(authorize("/profile", Some(&u)), GateDecision::Allow);
            // Non-admins may still see the login form
            assert_eq!(authorize("/login", Some(&u)), GateDecision::Allow);
            assert_eq!(
                authorize("/dashboard", Some(&u)),
                GateDecision::RedirectTo(LOGIN_PATH)
            );
        }
    }

    #[test]
    fn test_admin_on_auth_pages() {
        let admin = user(UserRole::Admin);
        for page in AUTH_PAGES {
            assert_eq!(
                authorize(page, Some(&admin)),
                GateDecision::RedirectTo(DASHBOARD_PATH)
            );
        }
        // Assets and APIs are not auth pages
        assert_eq!(authorize("/api/auth/me", Some(&admin)), GateDecision::Allow);
        assert_eq!(authorize("/robots.txt", Some(&admin)), GateDecision::Allow);
    }

    fn any_role() -> impl Strategy<Value = UserRole> {
        prop_oneof![
            Just(UserRole::Admin),
            Just(UserRole::Official),
            Just(UserRole::Staff),
            Just(UserRole::User),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Public paths are never redirected to login, whoever asks.
        #[test]
        fn property_public_paths_never_go_to_login(
            prefix in prop::sample::select(PUBLIC_PATHS.to_vec()),
            tail in "(/[a-z0-9._-]{1,12}){0,3}",
            role in prop::option::of(any_role()),
        ) {
            let path = format!("{}{}", prefix, tail);
            let u = role.map(user);
            prop_assert_ne!(authorize(&path, u.as_ref()), GateDecision::RedirectTo(LOGIN_PATH));
        }

        /// Anything under the dashboard is allowed for admins and nobody else.
        #[test]
        fn property_dashboard_is_admin_only(
            tail in "(/[a-z0-9-]{1,12}){0,3}",
            role in prop::option::of(any_role()),
        ) {
            let path = format!("{}{}", DASHBOARD_PATH, tail);
            let u = role.map(user);
            let expected = if role == Some(UserRole::Admin) {
                GateDecision::Allow
            } else {
                GateDecision::RedirectTo(LOGIN_PATH)
            };
            prop_assert_eq!(authorize(&path, u.as_ref()), expected);
        }

        /// Without a user, every non-public path redirects to login.
        #[test]
        fn property_anonymous_non_public_redirects(path in "/[a-z]{1,10}(/[a-z0-9]{1,8}){0,2}") {
            prop_assume!(!is_public_path(&path));
            prop_assert_eq!(authorize(&path, None), GateDecision::RedirectTo(LOGIN_PATH));
        }
    }
}

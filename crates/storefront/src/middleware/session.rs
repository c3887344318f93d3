//! Admin session configuration.
//!
//! The admin back office is gated by a server-side session. The browser only
//! ever holds an opaque id in the `admin_session` cookie; the `authenticated`
//! flag lives in the session store (`PostgreSQL` in production).

use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::config::StorefrontConfig;

/// Admin session cookie name.
pub const ADMIN_SESSION_COOKIE: &str = "admin_session";

/// Idle timeout for admin sessions (8 hours).
const SESSION_IDLE_SECONDS: i64 = 8 * 60 * 60;

/// Keys stored in the admin session.
pub mod session_keys {
    /// `true` once the admin has logged in.
    pub const AUTHENTICATED: &str = "authenticated";
    /// Username the session was opened with.
    pub const USERNAME: &str = "admin_username";
    /// RFC 3339 login timestamp.
    pub const LOGGED_IN_AT: &str = "logged_in_at";
}

/// Create the admin session layer over any session store.
///
/// Production passes a `PostgresStore`; tests pass a `MemoryStore`.
#[must_use]
pub fn create_session_layer<S>(store: S, config: &StorefrontConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(ADMIN_SESSION_COOKIE)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_IDLE_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/api/admin")
}

//! HTTP middleware stack for the storefront API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with `request_id` field)
//! 3. Request ID
//! 4. Security headers
//! 5. CORS
//! 6. Rate limiting (per route group, governor)
//! 7. Admin session layer (`/api/admin` only)

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{CurrentAdmin, RequireAdmin};
pub use rate_limit::{api_rate_limiter, checkout_rate_limiter, login_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::{ADMIN_SESSION_COOKIE, create_session_layer, session_keys};

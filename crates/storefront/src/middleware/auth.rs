//! Admin authentication extractor.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use super::session::session_keys;
use crate::error::AppError;

/// Extractor that requires an authenticated admin session.
///
/// Rejects with `401 {"error":"unauthorized"}` when the session is missing
/// or was never authenticated.
///
/// # Example
///
/// ```rust,ignore
/// async fn dashboard(RequireAdmin(admin): RequireAdmin) -> Json<Value> {
///     Json(json!({ "hello": admin.username }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub CurrentAdmin);

/// The admin behind the current request.
#[derive(Debug, Clone)]
pub struct CurrentAdmin {
    pub username: String,
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by SessionManagerLayer
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or_else(|| AppError::Unauthorized("admin session required".to_owned()))?;

        let authenticated: bool = session
            .get(session_keys::AUTHENTICATED)
            .await
            .map_err(|e| AppError::Internal(format!("session store: {e}")))?
            .unwrap_or(false);
        if !authenticated {
            return Err(AppError::Unauthorized("admin session required".to_owned()));
        }

        let username: String = session
            .get(session_keys::USERNAME)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();

        tracing::Span::current().record("admin", username.as_str());
        Ok(Self(CurrentAdmin { username }))
    }
}

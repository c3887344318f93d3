//! Admin login, logout and session probe.
//!
//! Credentials are static (from configuration). A successful login rotates
//! the session id and stores `authenticated = true` server-side; the
//! `admin_session` cookie only ever carries the opaque id.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::error::{AppError, Result};
use crate::extract::ApiJson;
use crate::middleware::session_keys;
use crate::phonepe::signature::constant_time_compare;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Login is mounted separately so it can carry its own rate limiter.
pub fn login_router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/session", get(session_info))
}

/// Compare digests so neither the length nor the content leaks through timing.
fn matches(submitted: &str, expected: &str) -> bool {
    let a = hex::encode(Sha256::digest(submitted.as_bytes()));
    let b = hex::encode(Sha256::digest(expected.as_bytes()));
    constant_time_compare(&a, &b)
}

fn session_error(e: &tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("session store: {e}"))
}

/// POST /api/admin/login
#[instrument(skip(state, session))]
async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<SessionInfo>> {
    let admin = &state.config().admin;
    let username_ok = matches(request.username.trim(), &admin.username);
    let password_ok = matches(&request.password, admin.password.expose_secret());

    if !(username_ok & password_ok) {
        warn!(username = %request.username, "Admin login failed");
        return Err(AppError::Unauthorized("invalid credentials".to_owned()));
    }

    // Fresh id on privilege change
    session.cycle_id().await.map_err(|e| session_error(&e))?;
    session
        .insert(session_keys::AUTHENTICATED, true)
        .await
        .map_err(|e| session_error(&e))?;
    session
        .insert(session_keys::USERNAME, &admin.username)
        .await
        .map_err(|e| session_error(&e))?;
    session
        .insert(session_keys::LOGGED_IN_AT, Utc::now().to_rfc3339())
        .await
        .map_err(|e| session_error(&e))?;

    info!(username = %admin.username, "Admin logged in");
    Ok(Json(SessionInfo {
        authenticated: true,
        username: Some(admin.username.clone()),
    }))
}

/// POST /api/admin/logout
async fn logout(session: Session) -> Result<StatusCode> {
    session.flush().await.map_err(|e| session_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/session
async fn session_info(session: Session) -> Result<Json<SessionInfo>> {
    let authenticated: bool = session
        .get(session_keys::AUTHENTICATED)
        .await
        .map_err(|e| session_error(&e))?
        .unwrap_or(false);
    let username = if authenticated {
        session
            .get::<String>(session_keys::USERNAME)
            .await
            .map_err(|e| session_error(&e))?
    } else {
        None
    };
    Ok(Json(SessionInfo {
        authenticated,
        username,
    }))
}

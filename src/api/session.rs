//! Session binding and the request guards built on it.
//!
//! The session store only ever holds the user id. Every guarded request
//! loads the account fresh, so edits and deactivation apply immediately.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tower_sessions::{Expiry, Session};

use super::{ApiError, AppState};
use crate::config::{SessionConfig, SessionExpiry};
use crate::db::User;
use crate::services::AuthService;

pub const USER_ID_KEY: &str = "user_id";
pub const OAUTH_STATE_KEY: &str = "oauth_state";
pub const ADMIN_PERMISSION: &str = "admin";
/// Unix timestamp of an absolute session deadline.
pub const EXPIRES_AT_KEY: &str = "expires_at";

fn session_error(e: tower_sessions::session::Error) -> ApiError {
    ApiError::internal(format!("Session error: {e}"))
}

/// Attach an authenticated user to the session.
///
/// The session id is rotated first so an identifier planted before login
/// cannot be reused afterwards.
pub async fn bind(session: &Session, user_id: i32, config: &SessionConfig) -> Result<(), ApiError> {
    session.cycle_id().await.map_err(session_error)?;
    session
        .insert(USER_ID_KEY, user_id)
        .await
        .map_err(session_error)?;

    if config.expiry == SessionExpiry::Absolute {
        let deadline = OffsetDateTime::now_utc()
            .checked_add(config.ttl())
            .ok_or_else(|| ApiError::internal("Session deadline out of range"))?
            .unix_timestamp();
        session
            .insert(EXPIRES_AT_KEY, deadline)
            .await
            .map_err(session_error)?;
        session.set_expiry(Some(deadline_expiry(deadline)?));
    } else {
        session
            .remove::<i64>(EXPIRES_AT_KEY)
            .await
            .map_err(session_error)?;
    }

    Ok(())
}

/// Restore the absolute deadline stored at [`bind`]. Any handler that writes
/// to a session must call this, otherwise the save falls back to the
/// layer's default expiry.
pub async fn keep_deadline(session: &Session) -> Result<(), ApiError> {
    let Some(timestamp) = session
        .get::<i64>(EXPIRES_AT_KEY)
        .await
        .map_err(session_error)?
    else {
        return Ok(());
    };

    session.set_expiry(Some(deadline_expiry(timestamp)?));
    Ok(())
}

fn deadline_expiry(timestamp: i64) -> Result<Expiry, ApiError> {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .map(Expiry::AtDateTime)
        .map_err(|e| ApiError::internal(format!("Invalid session deadline: {e}")))
}

/// The user bound to this session, if any. A session pointing at a missing
/// or deactivated account is flushed.
pub async fn resolve(session: &Session, auth: &dyn AuthService) -> Result<Option<User>, ApiError> {
    let Some(user_id) = session
        .get::<i32>(USER_ID_KEY)
        .await
        .map_err(session_error)?
    else {
        return Ok(None);
    };

    let user = auth.resolve_session_user(user_id).await?;
    if user.is_none() {
        tracing::debug!(user_id, "Dropping session of unusable account");
        session.flush().await.map_err(session_error)?;
    }

    Ok(user)
}

/// Remove the server-side record and expire the cookie.
pub async fn destroy(session: &Session) -> Result<(), ApiError> {
    session.flush().await.map_err(session_error)
}

/// The authenticated user, placed in request extensions by [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(ApiError::unauthorized)
    }
}

/// Rejects requests without a live session with 401.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve(&session, state.auth().as_ref())
        .await?
        .ok_or_else(ApiError::unauthorized)?;

    tracing::Span::current().record("user_id", user.id);
    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}

/// Rejects users without the `admin` permission with 403. Must run after
/// [`require_session`].
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = request
        .extensions()
        .get::<CurrentUser>()
        .map(|current| current.0.id)
        .ok_or_else(ApiError::unauthorized)?;

    state
        .auth()
        .require_permission(user_id, ADMIN_PERMISSION)
        .await?;

    Ok(next.run(request).await)
}

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::Session;
use tracing::{info, warn};

use super::session::{self, CurrentUser, OAUTH_STATE_KEY};
use super::validation::{validate_email, validate_name, validate_required};
use super::{ApiError, ApiResponse, AppState, MessageResponse, UserDto};
use crate::services::{AuthError, Registration, UserProfile, tokens::generate_token};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserDto,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(alias = "currentPassword")]
    pub current_password: String,
    #[serde(alias = "newPassword")]
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub const RESET_REQUESTED_MESSAGE: &str = "If that email exists, a reset link has been sent";

// ============================================================================
// Local accounts
// ============================================================================

/// POST /auth/register
/// Create an inactive account and mail its activation link
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&payload.email)?.to_string();
    let name = payload
        .name
        .as_deref()
        .map(validate_name)
        .transpose()?
        .map(str::to_string);
    validate_required(&payload.password, "Password")?;

    let user = state
        .auth()
        .register(Registration {
            name,
            email,
            password: payload.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(RegisterResponse {
            message: "Registration successful. Check your email to activate your account."
                .to_string(),
            user: user.into(),
        })),
    ))
}

/// POST /auth/activate
pub async fn activate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.auth().activate(payload.token.trim()).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Account activated. You can now log in.",
    ))))
}

/// POST /auth/login
/// Verify email and password and bind the session
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    validate_required(&payload.email, "Email")?;
    validate_required(&payload.password, "Password")?;

    let user = state
        .auth()
        .login(payload.email.trim(), &payload.password)
        .await?;

    session::bind(&session, user.id, &state.config().session).await?;
    info!(user_id = user.id, "User logged in");

    Ok(Json(ApiResponse::success(user.into())))
}

/// POST /auth/logout
pub async fn logout(session: Session) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    session::destroy(&session).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new("Logged out"))))
}

/// POST /auth/forgot-password
/// Answers identically whether or not the account exists
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let email = validate_email(&payload.email)?;
    state.auth().forgot_password(email).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        RESET_REQUESTED_MESSAGE,
    ))))
}

/// POST /auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth()
        .reset_password(payload.token.trim(), &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password has been reset",
    ))))
}

// ============================================================================
// Google
// ============================================================================

/// GET /auth/google
/// Redirect to the provider's consent page
pub async fn google_login(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Redirect, ApiError> {
    let google = state
        .google()
        .ok_or_else(|| ApiError::NotFound("Google login is not configured".to_string()))?;

    let csrf_state = generate_token();
    session
        .insert(OAUTH_STATE_KEY, &csrf_state)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;
    session::keep_deadline(&session).await?;

    let url = google.authorize_url(&csrf_state)?;
    Ok(Redirect::to(url.as_str()))
}

/// GET /auth/google/callback
/// Complete the code exchange and bind the session, then return to the frontend
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Response, ApiError> {
    let google = state
        .google()
        .ok_or_else(|| ApiError::NotFound("Google login is not configured".to_string()))?;
    let failure = Redirect::to(google.failure_redirect()).into_response();

    let expected = session
        .remove::<String>(OAUTH_STATE_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;
    session::keep_deadline(&session).await?;

    if let Some(error) = query.error {
        warn!(error = %error, "Provider denied login");
        return Ok(failure);
    }

    let (Some(code), Some(returned)) = (query.code, query.state) else {
        warn!("OAuth callback without code or state");
        return Ok(failure);
    };

    if expected.as_deref() != Some(returned.as_str()) {
        warn!("OAuth state mismatch");
        return Ok(failure);
    }

    let outcome = match google.fetch_profile(&code).await {
        Ok(profile) => state.auth().login_federated(profile).await,
        Err(e) => Err(AuthError::ExternalLogin(format!("{e:#}"))),
    };

    let user = match outcome {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "Google login rejected");
            return Ok(failure);
        }
    };

    session::bind(&session, user.id, &state.config().session).await?;
    info!(user_id = user.id, "User logged in with Google");

    Ok(Redirect::to(google.success_redirect()).into_response())
}

// ============================================================================
// Current user
// ============================================================================

/// GET /auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    let profile = state.auth().profile(user.id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

/// PUT /auth/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    let name = payload
        .name
        .as_deref()
        .map(validate_name)
        .transpose()?
        .map(str::to_string);
    let email = payload
        .email
        .as_deref()
        .map(validate_email)
        .transpose()?
        .map(str::to_string);

    let profile = state.auth().update_profile(user.id, name, email).await?;
    Ok(Json(ApiResponse::success(profile)))
}

/// PUT /auth/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth()
        .change_password(user.id, &payload.current_password, &payload.new_password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password changed successfully",
    ))))
}

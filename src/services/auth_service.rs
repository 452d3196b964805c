//! Domain service for authentication and account self-service.
//!
//! Handles registration, activation, local and federated login, password
//! recovery, profile edits and permission checks.

use serde::Serialize;
use thiserror::Error;

use crate::db::User;
use crate::services::strategy::FederatedProfile;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Forbidden")]
    Forbidden,

    #[error("User already registered")]
    AlreadyRegistered,

    #[error("Email already in use")]
    EmailInUse,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("{0}")]
    Validation(String),

    #[error("{0} is disabled")]
    FeatureDisabled(&'static str),

    #[error("Account is not activated")]
    AccountInactive,

    #[error("No email from provider")]
    NoProviderEmail,

    #[error("External login failed: {0}")]
    ExternalLogin(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

/// The authenticated user as exposed to clients.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i32,
    pub name: Option<String>,
    pub email: String,
    pub is_active: bool,
    pub permissions: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserProfile {
    #[must_use]
    pub fn new(user: User, permissions: Vec<String>) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            is_active: user.is_active,
            permissions,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Registration request after transport-level validation.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates an inactive account and mails its activation token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::FeatureDisabled`] when registration is switched
    /// off and [`AuthError::AlreadyRegistered`] if the email is taken.
    async fn register(&self, registration: Registration) -> Result<User, AuthError>;

    /// Redeems an activation token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] if no account holds the token.
    async fn activate(&self, token: &str) -> Result<(), AuthError>;

    /// Verifies local credentials. Inactive accounts are refused.
    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// Resolves a provider profile to a local account, creating it on first
    /// login.
    async fn login_federated(&self, profile: FederatedProfile) -> Result<User, AuthError>;

    /// Issues a reset token and mails it if the account exists. Succeeds
    /// whether or not it does.
    async fn forgot_password(&self, email: &str) -> Result<(), AuthError>;

    /// Redeems a reset token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidOrExpiredToken`] if no account holds it.
    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError>;

    /// Loads the account bound to a session. `None` means the session no
    /// longer identifies a usable account.
    async fn resolve_session_user(&self, user_id: i32) -> Result<Option<User>, AuthError>;

    async fn profile(&self, user_id: i32) -> Result<UserProfile, AuthError>;

    async fn update_profile(
        &self,
        user_id: i32,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<UserProfile, AuthError>;

    /// Changes a user's password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if current password is incorrect or new password invalid.
    async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;

    /// Succeeds if the user holds the permission `code`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] otherwise.
    async fn require_permission(&self, user_id: i32, code: &str) -> Result<(), AuthError>;
}

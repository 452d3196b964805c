//! Domain service for administrator account management.

use serde::Serialize;

use crate::db::Permission;
use crate::db::repositories::user::UserChanges;
use crate::services::auth_service::{AuthError, UserProfile};

#[derive(Debug, Clone, Serialize)]
pub struct PermissionDto {
    pub id: i32,
    pub name: String,
    pub code: String,
}

impl From<Permission> for PermissionDto {
    fn from(p: Permission) -> Self {
        Self {
            id: p.id,
            name: p.name,
            code: p.code,
        }
    }
}

/// A user together with the permission catalog, for the admin edit view.
#[derive(Debug, Clone, Serialize)]
pub struct UserDetail {
    pub user: UserProfile,
    pub all_permissions: Vec<PermissionDto>,
}

#[async_trait::async_trait]
pub trait UserService: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserProfile>, AuthError>;

    async fn get_user(&self, id: i32) -> Result<UserDetail, AuthError>;

    /// # Errors
    ///
    /// Returns [`AuthError::EmailInUse`] if the new email belongs to another user.
    async fn update_user(&self, id: i32, changes: UserChanges) -> Result<UserProfile, AuthError>;

    async fn set_password(&self, id: i32, password: &str) -> Result<(), AuthError>;

    /// Replaces the user's whole permission set. Returns the granted codes.
    async fn set_permissions(&self, id: i32, codes: &[String]) -> Result<Vec<String>, AuthError>;

    /// Creates the first administrator. Refuses if any account exists.
    async fn seed_admin(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<UserProfile, AuthError>;
}

//! `SeaORM` implementation of the `UserService` trait.

use async_trait::async_trait;
use tracing::info;

use crate::config::SecurityConfig;
use crate::db::Store;
use crate::db::repositories::user::{CreateOutcome, NewUser, UserChanges};
use crate::services::auth_service::{AuthError, UserProfile};
use crate::services::password::PasswordHasher;
use crate::services::user_service::{PermissionDto, UserDetail, UserService};

/// Permissions every seeded administrator receives, as `(code, name)`.
pub const SEED_PERMISSIONS: [(&str, &str); 2] = [("user", "User"), ("admin", "Admin")];

pub struct SeaOrmUserService {
    store: Store,
    hasher: PasswordHasher,
    min_password_length: usize,
}

impl SeaOrmUserService {
    #[must_use]
    pub const fn new(store: Store, security: &SecurityConfig) -> Self {
        Self {
            store,
            hasher: PasswordHasher::new(security),
            min_password_length: security.min_password_length,
        }
    }

    async fn ensure_user(&self, id: i32) -> Result<(), AuthError> {
        if self.store.get_user(id).await?.is_none() {
            return Err(AuthError::NotFound("User".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserService for SeaOrmUserService {
    async fn list_users(&self) -> Result<Vec<UserProfile>, AuthError> {
        let users = self.store.user_repo().list_all().await?;

        let mut profiles = Vec::with_capacity(users.len());
        for user in users {
            let permissions = self.store.permission_codes_for(user.id).await?;
            profiles.push(UserProfile::new(user, permissions));
        }

        Ok(profiles)
    }

    async fn get_user(&self, id: i32) -> Result<UserDetail, AuthError> {
        let user = self
            .store
            .get_user(id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;
        let permissions = self.store.permission_codes_for(id).await?;
        let all_permissions = self
            .store
            .permission_repo()
            .list_all()
            .await?
            .into_iter()
            .map(PermissionDto::from)
            .collect();

        Ok(UserDetail {
            user: UserProfile::new(user, permissions),
            all_permissions,
        })
    }

    async fn update_user(&self, id: i32, changes: UserChanges) -> Result<UserProfile, AuthError> {
        let users = self.store.user_repo();

        if let Some(email) = &changes.email
            && users.email_in_use_by_other(email, id).await?
        {
            return Err(AuthError::EmailInUse);
        }

        let user = users
            .update(id, changes)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;
        let permissions = self.store.permission_codes_for(id).await?;

        info!(user_id = id, "User updated by administrator");
        Ok(UserProfile::new(user, permissions))
    }

    async fn set_password(&self, id: i32, password: &str) -> Result<(), AuthError> {
        self.ensure_user(id).await?;

        if password.chars().count() < self.min_password_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }

        let hash = self.hasher.hash(password).await?;
        self.store.user_repo().update_password(id, &hash).await?;

        info!(user_id = id, "Password set by administrator");
        Ok(())
    }

    async fn set_permissions(&self, id: i32, codes: &[String]) -> Result<Vec<String>, AuthError> {
        self.ensure_user(id).await?;

        let granted = self
            .store
            .permission_repo()
            .replace_for_user(id, codes)
            .await?;

        info!(user_id = id, permissions = ?granted, "Permissions replaced");
        Ok(granted)
    }

    async fn seed_admin(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<UserProfile, AuthError> {
        let users = self.store.user_repo();
        if users.count().await? > 0 {
            return Err(AuthError::Validation(
                "Users already exist in the database".to_string(),
            ));
        }

        if password.chars().count() < self.min_password_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }

        let password_hash = self.hasher.hash(password).await?;
        let new_user = NewUser {
            name: Some(name.unwrap_or_else(|| "Admin".to_string())),
            email: email.to_string(),
            password_hash: Some(password_hash),
            is_active: true,
            activation_token: None,
            provider_subject: None,
        };

        let user = match users
            .create_with_permissions(new_user, &SEED_PERMISSIONS)
            .await?
        {
            CreateOutcome::Created(user) => user,
            CreateOutcome::EmailTaken => return Err(AuthError::AlreadyRegistered),
        };

        let codes = self.store.permission_codes_for(user.id).await?;
        info!(user_id = user.id, "Administrator seeded");
        Ok(UserProfile::new(user, codes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> (Store, SeaOrmUserService) {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let security = SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        };
        (store.clone(), SeaOrmUserService::new(store, &security))
    }

    #[tokio::test]
    async fn test_seed_admin_once() {
        let (store, service) = service().await;

        let admin = service
            .seed_admin("root@x.com", "rootpassword", None)
            .await
            .unwrap();
        assert_eq!(admin.name.as_deref(), Some("Admin"));
        assert!(admin.is_active);
        assert_eq!(admin.permissions, vec!["admin", "user"]);
        assert_eq!(store.permission_repo().list_all().await.unwrap().len(), 2);

        let err = service
            .seed_admin("other@x.com", "rootpassword", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(store.user_repo().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_permission_replace_is_wholesale() {
        let (store, service) = service().await;
        let admin = service
            .seed_admin("root@x.com", "rootpassword", None)
            .await
            .unwrap();

        let granted = service
            .set_permissions(admin.id, &["admin".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(granted, vec!["admin"]);

        let repo = store.permission_repo();
        assert!(repo.user_has_permission(admin.id, "admin").await.unwrap());
        assert!(!repo.user_has_permission(admin.id, "user").await.unwrap());

        let granted = service.set_permissions(admin.id, &[]).await.unwrap();
        assert!(granted.is_empty());
        assert!(store.permission_codes_for(admin.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (_, service) = service().await;
        assert!(matches!(
            service.get_user(42).await,
            Err(AuthError::NotFound(_))
        ));
        assert!(matches!(
            service.set_password(42, "longenough").await,
            Err(AuthError::NotFound(_))
        ));
        assert!(matches!(
            service.set_permissions(42, &[]).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_user_toggles_active() {
        let (_, service) = service().await;
        let admin = service
            .seed_admin("root@x.com", "rootpassword", None)
            .await
            .unwrap();

        let updated = service
            .update_user(
                admin.id,
                UserChanges {
                    is_active: Some(false),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.email, "root@x.com");
    }
}

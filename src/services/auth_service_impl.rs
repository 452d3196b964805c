//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SecurityConfig;
use crate::db::repositories::user::{CreateOutcome, NewUser, UserChanges};
use crate::db::{Store, User};
use crate::services::auth_service::{AuthError, AuthService, Registration, UserProfile};
use crate::services::mail::Mailer;
use crate::services::password::PasswordHasher;
use crate::services::strategy::{self, Credentials, FederatedProfile, StrategyRegistry};
use crate::services::tokens::generate_token;

pub struct SeaOrmAuthService {
    store: Store,
    hasher: PasswordHasher,
    strategies: StrategyRegistry,
    mailer: Arc<dyn Mailer>,
    min_password_length: usize,
    recheck_active: bool,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(store: Store, security: &SecurityConfig, mailer: Arc<dyn Mailer>) -> Self {
        let hasher = PasswordHasher::new(security);
        let strategies = StrategyRegistry::with_defaults(&store, hasher.clone());

        Self {
            store,
            hasher,
            strategies,
            mailer,
            min_password_length: security.min_password_length,
            recheck_active: security.recheck_active_on_request,
        }
    }

    fn check_password(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.min_password_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }
        Ok(())
    }

    async fn flags(&self) -> Result<crate::db::FeatureFlags, AuthError> {
        Ok(self.store.get_feature_flags().await?.unwrap_or_default())
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(&self, registration: Registration) -> Result<User, AuthError> {
        if !self.flags().await?.registration_active {
            return Err(AuthError::FeatureDisabled("Registration"));
        }

        self.check_password(&registration.password)?;

        let users = self.store.user_repo();
        if users.get_by_email(&registration.email).await?.is_some() {
            return Err(AuthError::AlreadyRegistered);
        }

        let password_hash = self.hasher.hash(&registration.password).await?;
        let token = generate_token();

        let user = match users
            .create(NewUser {
                name: registration.name,
                email: registration.email,
                password_hash: Some(password_hash),
                is_active: false,
                activation_token: Some(token.clone()),
                provider_subject: None,
            })
            .await?
        {
            CreateOutcome::Created(user) => user,
            CreateOutcome::EmailTaken => return Err(AuthError::AlreadyRegistered),
        };

        info!(user_id = user.id, "User registered, pending activation");

        if let Err(e) = self.mailer.send_activation_email(&user.email, &token).await {
            warn!(user_id = user.id, error = %e, "Failed to send activation email");
        }

        Ok(user)
    }

    async fn activate(&self, token: &str) -> Result<(), AuthError> {
        if token.is_empty() || !self.store.user_repo().activate_by_token(token).await? {
            return Err(AuthError::InvalidToken);
        }

        info!("Account activated");
        Ok(())
    }

    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let credentials = Credentials::Password {
            email: email.to_string(),
            password: password.to_string(),
        };
        let user = self.strategies.verify(strategy::LOCAL, &credentials).await?;

        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        Ok(user)
    }

    async fn login_federated(&self, profile: FederatedProfile) -> Result<User, AuthError> {
        let user = self
            .strategies
            .verify(strategy::GOOGLE, &Credentials::Federated(profile))
            .await?;

        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        Ok(user)
    }

    async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        if !self.flags().await?.forgot_password_active {
            return Err(AuthError::FeatureDisabled("Password reset"));
        }

        let users = self.store.user_repo();
        let Some(user) = users.get_by_email(email).await? else {
            return Ok(());
        };

        if !user.has_password {
            return Ok(());
        }

        let token = generate_token();
        users.set_reset_token(user.id, &token).await?;

        if let Err(e) = self.mailer.send_password_reset_email(&user.email, &token).await {
            warn!(user_id = user.id, error = %e, "Failed to send password reset email");
        }

        Ok(())
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        self.check_password(new_password)?;
        let password_hash = self.hasher.hash(new_password).await?;

        if !self
            .store
            .user_repo()
            .reset_password_by_token(token, &password_hash)
            .await?
        {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        info!("Password reset via token");
        Ok(())
    }

    async fn resolve_session_user(&self, user_id: i32) -> Result<Option<User>, AuthError> {
        let user = self.store.get_user(user_id).await?;

        Ok(user.filter(|u| u.is_active || !self.recheck_active))
    }

    async fn profile(&self, user_id: i32) -> Result<UserProfile, AuthError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;
        let permissions = self.store.permission_codes_for(user_id).await?;

        Ok(UserProfile::new(user, permissions))
    }

    async fn update_profile(
        &self,
        user_id: i32,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<UserProfile, AuthError> {
        let users = self.store.user_repo();

        if let Some(email) = &email
            && users.email_in_use_by_other(email, user_id).await?
        {
            return Err(AuthError::EmailInUse);
        }

        users
            .update(
                user_id,
                UserChanges {
                    name,
                    email,
                    is_active: None,
                },
            )
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

        self.profile(user_id).await
    }

    async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.check_password(new_password)?;

        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        let users = self.store.user_repo();
        let (_, password_hash) = users
            .get_with_password(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

        // Federated-only accounts have no current password to confirm.
        let Some(password_hash) = password_hash else {
            return Err(AuthError::Validation(
                "Account has no password; use password reset instead".to_string(),
            ));
        };

        if !self.hasher.verify(current_password, &password_hash).await? {
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        let new_hash = self.hasher.hash(new_password).await?;
        users.update_password(user_id, &new_hash).await?;

        info!(user_id, "Password changed");
        Ok(())
    }

    async fn require_permission(&self, user_id: i32, code: &str) -> Result<(), AuthError> {
        if self
            .store
            .permission_repo()
            .user_has_permission(user_id, code)
            .await?
        {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mail::{MailKind, RecordingMailer};

    struct Harness {
        store: Store,
        mailer: Arc<RecordingMailer>,
        service: SeaOrmAuthService,
    }

    async fn harness() -> Harness {
        let store = Store::new("sqlite::memory:").await.unwrap();
        store.initialize_feature_flags().await.unwrap();
        let mailer = Arc::new(RecordingMailer::new());
        let security = SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        };
        let service = SeaOrmAuthService::new(store.clone(), &security, mailer.clone());
        Harness {
            store,
            mailer,
            service,
        }
    }

    fn alice() -> Registration {
        Registration {
            name: Some("Alice".to_string()),
            email: "alice@x.com".to_string(),
            password: "pw12345678".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_activate_login() {
        let h = harness().await;

        let user = h.service.register(alice()).await.unwrap();
        assert!(!user.is_active);

        let err = h.service.login("alice@x.com", "pw12345678").await.unwrap_err();
        assert!(matches!(err, AuthError::AccountInactive));

        let token = h
            .mailer
            .last_token(MailKind::Activation, "alice@x.com")
            .unwrap();
        let (stored, _) = h.store.user_repo().get_tokens("alice@x.com").await.unwrap().unwrap();
        assert_eq!(stored.as_deref(), Some(token.as_str()));

        h.service.activate(&token).await.unwrap();
        let (stored, _) = h.store.user_repo().get_tokens("alice@x.com").await.unwrap().unwrap();
        assert!(stored.is_none());

        let err = h.service.activate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));

        let logged_in = h.service.login("alice@x.com", "pw12345678").await.unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(logged_in.is_active);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let h = harness().await;
        h.service.register(alice()).await.unwrap();
        let err = h.service.register(alice()).await.unwrap_err();
        assert!(matches!(err, AuthError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn test_register_disabled_creates_nothing() {
        let h = harness().await;
        h.store
            .feature_flag_repo()
            .update(Some(false), None)
            .await
            .unwrap();

        let err = h.service.register(alice()).await.unwrap_err();
        assert!(matches!(err, AuthError::FeatureDisabled(_)));
        assert_eq!(h.store.user_repo().count().await.unwrap(), 0);
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_register_survives_mail_failure() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let security = SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        };
        let service =
            SeaOrmAuthService::new(store.clone(), &security, Arc::new(RecordingMailer::failing()));

        service.register(alice()).await.unwrap();
        assert_eq!(store.user_repo().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let h = harness().await;
        let err = h
            .service
            .register(Registration {
                password: "short".to_string(),
                ..alice()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reset_password_single_use() {
        let h = harness().await;
        h.service.register(alice()).await.unwrap();

        h.service.forgot_password("alice@x.com").await.unwrap();
        h.service.forgot_password("nobody@x.com").await.unwrap();
        assert_eq!(
            h.mailer
                .sent()
                .iter()
                .filter(|m| m.kind == MailKind::PasswordReset)
                .count(),
            1
        );

        let token = h
            .mailer
            .last_token(MailKind::PasswordReset, "alice@x.com")
            .unwrap();
        h.service.reset_password(&token, "newpassword1").await.unwrap();

        let err = h
            .service
            .reset_password(&token, "newpassword2")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));

        let activation = h
            .mailer
            .last_token(MailKind::Activation, "alice@x.com")
            .unwrap();
        h.service.activate(&activation).await.unwrap();
        assert!(h.service.login("alice@x.com", "newpassword1").await.is_ok());
        assert!(h.service.login("alice@x.com", "pw12345678").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_reset_keeps_password() {
        let h = harness().await;
        h.service.register(alice()).await.unwrap();
        h.service.forgot_password("alice@x.com").await.unwrap();

        let err = h
            .service
            .reset_password("not-the-token", "newpassword1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));

        let (_, reset) = h.store.user_repo().get_tokens("alice@x.com").await.unwrap().unwrap();
        assert!(reset.is_some());
    }

    #[tokio::test]
    async fn test_forgot_password_disabled() {
        let h = harness().await;
        h.store
            .feature_flag_repo()
            .update(None, Some(false))
            .await
            .unwrap();

        let err = h.service.forgot_password("alice@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::FeatureDisabled(_)));
    }

    #[tokio::test]
    async fn test_change_password() {
        let h = harness().await;
        let user = h.service.register(alice()).await.unwrap();

        let err = h
            .service
            .change_password(user.id, "wrong-password", "another-pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        h.service
            .change_password(user.id, "pw12345678", "another-pass")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_profile_email_collision() {
        let h = harness().await;
        let a = h.service.register(alice()).await.unwrap();
        h.service
            .register(Registration {
                email: "bob@x.com".to_string(),
                ..alice()
            })
            .await
            .unwrap();

        let err = h
            .service
            .update_profile(a.id, None, Some("bob@x.com".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailInUse));

        let profile = h
            .service
            .update_profile(a.id, Some("Alicia".to_string()), Some("alice@x.com".to_string()))
            .await
            .unwrap();
        assert_eq!(profile.name.as_deref(), Some("Alicia"));
    }

    #[tokio::test]
    async fn test_require_permission() {
        let h = harness().await;
        let user = h.service.register(alice()).await.unwrap();
        let permissions = h.store.permission_repo();
        for code in ["a", "b", "c"] {
            permissions.find_or_create(code, code).await.unwrap();
        }
        permissions
            .replace_for_user(user.id, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert!(h.service.require_permission(user.id, "a").await.is_ok());
        assert!(h.service.require_permission(user.id, "b").await.is_ok());
        assert!(matches!(
            h.service.require_permission(user.id, "c").await,
            Err(AuthError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_resolve_session_user_rejects_deactivated() {
        let h = harness().await;
        let user = h.service.register(alice()).await.unwrap();

        assert!(h.service.resolve_session_user(user.id).await.unwrap().is_none());
        assert!(h.service.resolve_session_user(9999).await.unwrap().is_none());

        let token = h
            .mailer
            .last_token(MailKind::Activation, "alice@x.com")
            .unwrap();
        h.service.activate(&token).await.unwrap();
        assert!(h.service.resolve_session_user(user.id).await.unwrap().is_some());
    }
}

//! Pluggable credential verification.
//!
//! A strategy turns credentials into a verified [`User`] and never touches
//! session state; binding is left to the caller.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::db::Store;
use crate::db::User;
use crate::db::repositories::user::{CreateOutcome, NewUser};
use crate::services::auth_service::AuthError;
use crate::services::password::PasswordHasher;

pub const LOCAL: &str = "local";
pub const GOOGLE: &str = "google";

/// Identity asserted by an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
    pub subject: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
}

impl FederatedProfile {
    /// The email, if the provider vouches for it.
    #[must_use]
    pub fn verified_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| self.email_verified && !e.is_empty())
    }
}

#[derive(Debug, Clone)]
pub enum Credentials {
    Password { email: String, password: String },
    Federated(FederatedProfile),
}

#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Negative outcomes such as a wrong password are returned as errors
    /// from the [`AuthError`] taxonomy, never as faults.
    async fn verify(&self, credentials: &Credentials) -> Result<User, AuthError>;
}

// ============================================================================
// Password
// ============================================================================

const DUMMY_PASSWORD: &str = "homebase-timing-equalizer";

pub struct PasswordStrategy {
    store: Store,
    hasher: PasswordHasher,
    /// Hash checked when there is no real one, so every failed login costs
    /// the same Argon2 work.
    dummy_hash: OnceCell<String>,
}

impl PasswordStrategy {
    #[must_use]
    pub fn new(store: Store, hasher: PasswordHasher) -> Self {
        Self {
            store,
            hasher,
            dummy_hash: OnceCell::new(),
        }
    }

    async fn verify_dummy(&self, password: &str) -> Result<(), AuthError> {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| self.hasher.hash(DUMMY_PASSWORD))
            .await?;
        self.hasher.verify(password, dummy).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthStrategy for PasswordStrategy {
    fn name(&self) -> &'static str {
        LOCAL
    }

    async fn verify(&self, credentials: &Credentials) -> Result<User, AuthError> {
        let Credentials::Password { email, password } = credentials else {
            return Err(AuthError::Internal(
                "password strategy received federated credentials".to_string(),
            ));
        };

        let Some((user, password_hash)) =
            self.store.user_repo().get_by_email_with_password(email).await?
        else {
            debug!("Login attempt for unknown email");
            self.verify_dummy(password).await?;
            return Err(AuthError::InvalidCredentials);
        };

        let Some(password_hash) = password_hash else {
            debug!(user_id = user.id, "Password login attempt on federated-only account");
            self.verify_dummy(password).await?;
            return Err(AuthError::InvalidCredentials);
        };

        if self.hasher.verify(password, &password_hash).await? {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

// ============================================================================
// Federated
// ============================================================================

pub struct FederatedStrategy {
    store: Store,
    name: &'static str,
}

impl FederatedStrategy {
    #[must_use]
    pub const fn new(store: Store, name: &'static str) -> Self {
        Self { store, name }
    }
}

#[async_trait]
impl AuthStrategy for FederatedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn verify(&self, credentials: &Credentials) -> Result<User, AuthError> {
        let Credentials::Federated(profile) = credentials else {
            return Err(AuthError::Internal(
                "federated strategy received password credentials".to_string(),
            ));
        };

        let email = profile.verified_email().ok_or(AuthError::NoProviderEmail)?;
        let users = self.store.user_repo();

        if let Some(user) = users.get_by_email(email).await? {
            return Ok(user);
        }

        let outcome = users
            .create(NewUser {
                name: profile.name.clone(),
                email: email.to_string(),
                password_hash: None,
                is_active: true,
                activation_token: None,
                provider_subject: Some(profile.subject.clone()),
            })
            .await?;

        match outcome {
            CreateOutcome::Created(user) => {
                info!(user_id = user.id, provider = self.name, "Created account from provider login");
                Ok(user)
            }
            // Lost a race with a concurrent first login for the same email.
            CreateOutcome::EmailTaken => users
                .get_by_email(email)
                .await?
                .ok_or_else(|| AuthError::Internal("user vanished after conflict".to_string())),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Arc<dyn AuthStrategy>>,
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the local password strategy and the Google strategy.
    #[must_use]
    pub fn with_defaults(store: &Store, hasher: PasswordHasher) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PasswordStrategy::new(store.clone(), hasher)));
        registry.register(Arc::new(FederatedStrategy::new(store.clone(), GOOGLE)));
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn AuthStrategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn AuthStrategy>> {
        self.strategies.get(name).cloned()
    }

    /// Run the strategy registered under `name`.
    pub async fn verify(&self, name: &str, credentials: &Credentials) -> Result<User, AuthError> {
        let strategy = self
            .get(name)
            .ok_or_else(|| AuthError::Internal(format!("unknown auth strategy: {name}")))?;
        strategy.verify(credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(&SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        })
    }

    async fn store_with_local_user(password: Option<&str>) -> Store {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let password_hash = match password {
            Some(pw) => Some(hasher().hash(pw).await.unwrap()),
            None => None,
        };
        store
            .user_repo()
            .create(NewUser {
                name: Some("Alice".to_string()),
                email: "alice@x.com".to_string(),
                password_hash,
                is_active: true,
                ..NewUser::default()
            })
            .await
            .unwrap();
        store
    }

    fn password(email: &str, pw: &str) -> Credentials {
        Credentials::Password {
            email: email.to_string(),
            password: pw.to_string(),
        }
    }

    fn profile(email: Option<&str>, verified: bool) -> FederatedProfile {
        FederatedProfile {
            subject: "google-sub-1".to_string(),
            email: email.map(str::to_string),
            email_verified: verified,
            name: Some("Bob".to_string()),
        }
    }

    #[tokio::test]
    async fn test_password_strategy_accepts_only_exact_password() {
        let store = store_with_local_user(Some("pw12345678")).await;
        let strategy = PasswordStrategy::new(store, hasher());

        let user = strategy
            .verify(&password("alice@x.com", "pw12345678"))
            .await
            .unwrap();
        assert_eq!(user.email, "alice@x.com");

        for wrong in ["", "pw1234567", "pw123456789", "PW12345678"] {
            let err = strategy
                .verify(&password("alice@x.com", wrong))
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials), "{wrong}");
        }
    }

    #[tokio::test]
    async fn test_password_strategy_unknown_email_is_generic() {
        let store = store_with_local_user(Some("pw12345678")).await;
        let strategy = PasswordStrategy::new(store, hasher());

        let err = strategy
            .verify(&password("nobody@x.com", "pw12345678"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        // The missing account still went through a hash check
        assert!(strategy.dummy_hash.initialized());
    }

    #[tokio::test]
    async fn test_password_strategy_real_login_skips_dummy_hash() {
        let store = store_with_local_user(Some("pw12345678")).await;
        let strategy = PasswordStrategy::new(store, hasher());

        strategy
            .verify(&password("alice@x.com", "pw12345678"))
            .await
            .unwrap();
        assert!(!strategy.dummy_hash.initialized());
    }

    #[tokio::test]
    async fn test_password_strategy_rejects_federated_only_account() {
        let store = store_with_local_user(None).await;
        let strategy = PasswordStrategy::new(store, hasher());

        let err = strategy.verify(&password("alice@x.com", "")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(strategy.dummy_hash.initialized());
    }

    #[tokio::test]
    async fn test_federated_strategy_creates_once() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let strategy = FederatedStrategy::new(store.clone(), GOOGLE);
        let creds = Credentials::Federated(profile(Some("bob@x.com"), true));

        let first = strategy.verify(&creds).await.unwrap();
        let second = strategy.verify(&creds).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.is_active);
        assert!(!first.has_password);
        assert_eq!(first.provider_subject.as_deref(), Some("google-sub-1"));
        assert_eq!(store.user_repo().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_federated_strategy_links_existing_local_account() {
        let store = store_with_local_user(Some("pw12345678")).await;
        let strategy = FederatedStrategy::new(store.clone(), GOOGLE);

        let user = strategy
            .verify(&Credentials::Federated(profile(Some("alice@x.com"), true)))
            .await
            .unwrap();

        assert!(user.has_password);
        assert_eq!(store.user_repo().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_federated_strategy_requires_verified_email() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let strategy = FederatedStrategy::new(store.clone(), GOOGLE);

        for p in [profile(None, true), profile(Some("bob@x.com"), false), profile(Some("  "), true)] {
            let err = strategy.verify(&Credentials::Federated(p)).await.unwrap_err();
            assert!(matches!(err, AuthError::NoProviderEmail));
        }
        assert_eq!(store.user_repo().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_registry_dispatch() {
        let store = store_with_local_user(Some("pw12345678")).await;
        let registry = StrategyRegistry::with_defaults(&store, hasher());

        assert!(registry.get(LOCAL).is_some());
        assert!(registry.get(GOOGLE).is_some());
        assert!(registry.get("github").is_none());

        let user = registry
            .verify(LOCAL, &password("alice@x.com", "pw12345678"))
            .await
            .unwrap();
        assert_eq!(user.name.as_deref(), Some("Alice"));

        let err = registry
            .verify(GOOGLE, &password("alice@x.com", "pw12345678"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }
}

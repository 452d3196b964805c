use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, GoogleOAuthClient, LettreMailer, Mailer, SeaOrmAuthService, SeaOrmUserService,
    UserService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub auth_service: Arc<dyn AuthService>,

    pub user_service: Arc<dyn UserService>,

    /// Present only when `[oauth.google]` is configured.
    pub google: Option<Arc<GoogleOAuthClient>>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mailer: Arc<dyn Mailer> = Arc::new(LettreMailer::new(&config)?);
        Self::with_mailer(config, mailer).await
    }

    /// Build state around a caller-supplied mailer.
    pub async fn with_mailer(config: Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        store.initialize_feature_flags().await?;

        Self::from_parts(config, store, mailer)
    }

    pub fn from_parts(config: Config, store: Store, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let auth_service: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            &config.security,
            mailer,
        ));

        let user_service: Arc<dyn UserService> =
            Arc::new(SeaOrmUserService::new(store.clone(), &config.security));

        let google = config
            .oauth
            .google
            .clone()
            .map(GoogleOAuthClient::new)
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            config: Arc::new(config),
            store,
            auth_service,
            user_service,
            google,
        })
    }
}

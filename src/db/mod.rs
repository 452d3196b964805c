use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::blood_pressure::{BloodPressureInput, BloodPressureRecord};
pub use repositories::feature_flag::FeatureFlags;
pub use repositories::music::{MusicInput, MusicSheet};
pub use repositories::permission::Permission;
pub use repositories::user::User;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:").trim_start_matches("//");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    /// Underlying sqlx pool, shared with the session store.
    #[must_use]
    pub fn sqlite_pool(&self) -> &sea_orm::sqlx::SqlitePool {
        self.conn.get_sqlite_connection_pool()
    }

    #[must_use]
    pub fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn permission_repo(&self) -> repositories::permission::PermissionRepository {
        repositories::permission::PermissionRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn feature_flag_repo(&self) -> repositories::feature_flag::FeatureFlagRepository {
        repositories::feature_flag::FeatureFlagRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn blood_pressure_repo(&self) -> repositories::blood_pressure::BloodPressureRepository {
        repositories::blood_pressure::BloodPressureRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn music_repo(&self) -> repositories::music::MusicRepository {
        repositories::music::MusicRepository::new(self.conn.clone())
    }

    /// Creates the feature flag row on first start.
    pub async fn initialize_feature_flags(&self) -> Result<()> {
        if self.feature_flag_repo().ensure_exists().await? {
            info!("Feature flags seeded");
        }
        Ok(())
    }

    // ========== Convenience Methods ==========

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_feature_flags(&self) -> Result<Option<FeatureFlags>> {
        self.feature_flag_repo().get().await
    }

    pub async fn permission_codes_for(&self, user_id: i32) -> Result<Vec<String>> {
        self.permission_repo().codes_for_user(user_id).await
    }
}

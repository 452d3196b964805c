use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use crate::entities::feature_flags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub registration_active: bool,
    pub forgot_password_active: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            registration_active: true,
            forgot_password_active: true,
        }
    }
}

impl From<feature_flags::Model> for FeatureFlags {
    fn from(model: feature_flags::Model) -> Self {
        Self {
            registration_active: model.registration_active,
            forgot_password_active: model.forgot_password_active,
        }
    }
}

pub struct FeatureFlagRepository {
    conn: DatabaseConnection,
}

impl FeatureFlagRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    async fn first_row(&self) -> Result<Option<feature_flags::Model>> {
        feature_flags::Entity::find()
            .order_by_asc(feature_flags::Column::Id)
            .one(&self.conn)
            .await
            .context("Failed to query feature flags")
    }

    /// Insert the default row if the table is empty. Returns `true` if a row
    /// was created.
    pub async fn ensure_exists(&self) -> Result<bool> {
        if self.first_row().await?.is_some() {
            return Ok(false);
        }

        let defaults = FeatureFlags::default();
        let now = chrono::Utc::now().to_rfc3339();
        feature_flags::ActiveModel {
            registration_active: Set(defaults.registration_active),
            forgot_password_active: Set(defaults.forgot_password_active),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to create feature flags")?;

        Ok(true)
    }

    pub async fn get(&self) -> Result<Option<FeatureFlags>> {
        Ok(self.first_row().await?.map(FeatureFlags::from))
    }

    /// Apply the provided toggles, leaving `None` fields unchanged.
    pub async fn update(
        &self,
        registration_active: Option<bool>,
        forgot_password_active: Option<bool>,
    ) -> Result<FeatureFlags> {
        self.ensure_exists().await?;
        let row = self
            .first_row()
            .await?
            .ok_or_else(|| anyhow::anyhow!("Feature flags row missing"))?;

        let now = chrono::Utc::now().to_rfc3339();
        let mut active: feature_flags::ActiveModel = row.into();
        if let Some(value) = registration_active {
            active.registration_active = Set(value);
        }
        if let Some(value) = forgot_password_active {
            active.forgot_password_active = Set(value);
        }
        active.updated_at = Set(now);

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update feature flags")?;

        Ok(FeatureFlags::from(model))
    }
}

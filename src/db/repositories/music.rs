use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use serde::Serialize;

use crate::entities::music;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MusicSheet {
    pub id: i32,
    pub title: String,
    pub contents: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

impl MusicSheet {
    fn from_model(model: music::Model) -> Result<Self> {
        let contents = serde_json::from_str(&model.contents)
            .with_context(|| format!("Corrupt contents for music sheet {}", model.id))?;

        Ok(Self {
            id: model.id,
            title: model.title,
            contents,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicInput {
    pub title: String,
    pub contents: serde_json::Value,
}

pub struct MusicRepository {
    conn: DatabaseConnection,
}

impl MusicRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// All sheets ordered by title.
    pub async fn list(&self) -> Result<Vec<MusicSheet>> {
        let rows = music::Entity::find()
            .order_by_asc(music::Column::Title)
            .order_by_asc(music::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list music")?;

        rows.into_iter().map(MusicSheet::from_model).collect()
    }

    pub async fn get(&self, id: i32) -> Result<Option<MusicSheet>> {
        music::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query music")?
            .map(MusicSheet::from_model)
            .transpose()
    }

    pub async fn create(&self, input: MusicInput) -> Result<MusicSheet> {
        let now = chrono::Utc::now().to_rfc3339();
        let model = music::ActiveModel {
            title: Set(input.title),
            contents: Set(input.contents.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert music")?;

        MusicSheet::from_model(model)
    }

    pub async fn update(&self, id: i32, input: MusicInput) -> Result<Option<MusicSheet>> {
        let Some(row) = music::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query music")?
        else {
            return Ok(None);
        };

        let mut active: music::ActiveModel = row.into();
        active.title = Set(input.title);
        active.contents = Set(input.contents.to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update music")?;

        MusicSheet::from_model(model).map(Some)
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = music::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete music")?;

        Ok(result.rows_affected > 0)
    }
}

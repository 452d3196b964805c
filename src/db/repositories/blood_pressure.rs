use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;

use crate::entities::blood_pressure;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BloodPressureRecord {
    pub id: i32,
    pub measured_at: DateTime<Utc>,
    pub systolic: i32,
    pub diastolic: i32,
    pub pulse: i32,
    pub weight: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<blood_pressure::Model> for BloodPressureRecord {
    fn from(model: blood_pressure::Model) -> Self {
        Self {
            id: model.id,
            measured_at: model.measured_at,
            systolic: model.systolic,
            diastolic: model.diastolic,
            pulse: model.pulse,
            weight: model.weight,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BloodPressureInput {
    pub measured_at: DateTime<Utc>,
    pub systolic: i32,
    pub diastolic: i32,
    pub pulse: i32,
    pub weight: f64,
}

pub struct BloodPressureRepository {
    conn: DatabaseConnection,
}

impl BloodPressureRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Measurements taken at or after `since` (all if `None`), newest first.
    pub async fn list(&self, since: Option<DateTime<Utc>>) -> Result<Vec<BloodPressureRecord>> {
        let mut query = blood_pressure::Entity::find();
        if let Some(since) = since {
            query = query.filter(blood_pressure::Column::MeasuredAt.gte(since));
        }

        let rows = query
            .order_by_desc(blood_pressure::Column::MeasuredAt)
            .order_by_desc(blood_pressure::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list blood pressure measurements")?;

        Ok(rows.into_iter().map(BloodPressureRecord::from).collect())
    }

    pub async fn get(&self, id: i32) -> Result<Option<BloodPressureRecord>> {
        let row = blood_pressure::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query blood pressure measurement")?;

        Ok(row.map(BloodPressureRecord::from))
    }

    pub async fn create(&self, input: BloodPressureInput) -> Result<BloodPressureRecord> {
        let now = Utc::now().to_rfc3339();
        let model = blood_pressure::ActiveModel {
            measured_at: Set(input.measured_at),
            systolic: Set(input.systolic),
            diastolic: Set(input.diastolic),
            pulse: Set(input.pulse),
            weight: Set(input.weight),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert blood pressure measurement")?;

        Ok(BloodPressureRecord::from(model))
    }

    /// Overwrite a measurement. Returns `None` if it does not exist.
    pub async fn update(
        &self,
        id: i32,
        input: BloodPressureInput,
    ) -> Result<Option<BloodPressureRecord>> {
        let Some(row) = blood_pressure::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query blood pressure measurement")?
        else {
            return Ok(None);
        };

        let mut active: blood_pressure::ActiveModel = row.into();
        active.measured_at = Set(input.measured_at);
        active.systolic = Set(input.systolic);
        active.diastolic = Set(input.diastolic);
        active.pulse = Set(input.pulse);
        active.weight = Set(input.weight);
        active.updated_at = Set(Utc::now().to_rfc3339());

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update blood pressure measurement")?;

        Ok(Some(BloodPressureRecord::from(model)))
    }

    /// Returns `false` if nothing was deleted.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = blood_pressure::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete blood pressure measurement")?;

        Ok(result.rows_affected > 0)
    }
}

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "blood_pressure")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub measured_at: DateTimeUtc,
    pub systolic: i32,
    pub diastolic: i32,
    pub pulse: i32,
    pub weight: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

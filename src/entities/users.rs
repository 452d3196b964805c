use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Subject identifier issued by an external identity provider.
    pub provider_subject: Option<String>,

    pub name: Option<String>,

    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password hash. `None` for accounts created through federated login.
    pub password_hash: Option<String>,

    pub is_active: bool,

    /// Single-use activation token (64-char hex string)
    pub activation_token: Option<String>,

    /// Single-use password reset token (64-char hex string)
    pub reset_token: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_permissions::Entity")]
    UserPermissions,
}

impl Related<super::user_permissions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserPermissions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

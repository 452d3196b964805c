use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use std::collections::BTreeSet;

use crate::entities::{permissions, user_permissions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub id: i32,
    pub name: String,
    pub code: String,
}

impl From<permissions::Model> for Permission {
    fn from(model: permissions::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            code: model.code,
        }
    }
}

pub struct PermissionRepository {
    conn: DatabaseConnection,
}

impl PermissionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    pub async fn list_all(&self) -> Result<Vec<Permission>> {
        let rows = permissions::Entity::find()
            .order_by_asc(permissions::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list permissions")?;

        Ok(rows.into_iter().map(Permission::from).collect())
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<Permission>> {
        let row = permissions::Entity::find()
            .filter(permissions::Column::Code.eq(code))
            .one(&self.conn)
            .await
            .context("Failed to query permission by code")?;

        Ok(row.map(Permission::from))
    }

    /// Look up a permission by code, creating it with `name` if missing.
    pub async fn find_or_create(&self, code: &str, name: &str) -> Result<Permission> {
        find_or_create_in(&self.conn, code, name).await
    }

    // ========================================================================
    // Grants
    // ========================================================================

    /// Permission codes granted to a user, sorted and without duplicates.
    pub async fn codes_for_user(&self, user_id: i32) -> Result<Vec<String>> {
        let rows: Vec<String> = permissions::Entity::find()
            .select_only()
            .column(permissions::Column::Code)
            .join(
                JoinType::InnerJoin,
                permissions::Relation::UserPermissions.def(),
            )
            .filter(user_permissions::Column::UserId.eq(user_id))
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to query user permissions")?;

        let unique: BTreeSet<String> = rows.into_iter().collect();
        Ok(unique.into_iter().collect())
    }

    pub async fn user_has_permission(&self, user_id: i32, code: &str) -> Result<bool> {
        let count = permissions::Entity::find()
            .join(
                JoinType::InnerJoin,
                permissions::Relation::UserPermissions.def(),
            )
            .filter(user_permissions::Column::UserId.eq(user_id))
            .filter(permissions::Column::Code.eq(code))
            .count(&self.conn)
            .await
            .context("Failed to check user permission")?;

        Ok(count > 0)
    }

    /// Grant a permission to a user unless already granted.
    pub async fn grant(&self, user_id: i32, permission_id: i32) -> Result<()> {
        grant_in(&self.conn, user_id, permission_id).await
    }

    /// Replace every grant of a user with the permissions named by `codes`.
    ///
    /// Unknown codes are ignored. Runs in a single transaction so readers
    /// never observe a partially replaced set.
    pub async fn replace_for_user(&self, user_id: i32, codes: &[String]) -> Result<Vec<String>> {
        let wanted: BTreeSet<&str> = codes.iter().map(String::as_str).collect();

        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to begin permission transaction")?;

        let matching = if wanted.is_empty() {
            Vec::new()
        } else {
            permissions::Entity::find()
                .filter(permissions::Column::Code.is_in(wanted.iter().copied()))
                .all(&txn)
                .await
                .context("Failed to resolve permission codes")?
        };

        user_permissions::Entity::delete_many()
            .filter(user_permissions::Column::UserId.eq(user_id))
            .exec(&txn)
            .await
            .context("Failed to clear user permissions")?;

        if !matching.is_empty() {
            let now = chrono::Utc::now().to_rfc3339();
            let grants = matching.iter().map(|p| user_permissions::ActiveModel {
                user_id: Set(user_id),
                permission_id: Set(p.id),
                created_at: Set(now.clone()),
                updated_at: Set(now.clone()),
                ..Default::default()
            });

            user_permissions::Entity::insert_many(grants)
                .exec(&txn)
                .await
                .context("Failed to insert user permissions")?;
        }

        txn.commit()
            .await
            .context("Failed to commit permission transaction")?;

        let mut granted: Vec<String> = matching.into_iter().map(|p| p.code).collect();
        granted.sort();
        Ok(granted)
    }
}

/// [`PermissionRepository::find_or_create`] on any connection, including a
/// transaction.
pub async fn find_or_create_in<C: ConnectionTrait>(
    db: &C,
    code: &str,
    name: &str,
) -> Result<Permission> {
    let existing = permissions::Entity::find()
        .filter(permissions::Column::Code.eq(code))
        .one(db)
        .await
        .with_context(|| format!("Failed to look up permission {code}"))?;

    if let Some(model) = existing {
        return Ok(Permission::from(model));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let model = permissions::ActiveModel {
        name: Set(name.to_string()),
        code: Set(code.to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .with_context(|| format!("Failed to create permission {code}"))?;

    Ok(Permission::from(model))
}

/// Idempotent grant on any connection.
pub async fn grant_in<C: ConnectionTrait>(db: &C, user_id: i32, permission_id: i32) -> Result<()> {
    let existing = user_permissions::Entity::find()
        .filter(user_permissions::Column::UserId.eq(user_id))
        .filter(user_permissions::Column::PermissionId.eq(permission_id))
        .count(db)
        .await
        .context("Failed to query existing grant")?;

    if existing > 0 {
        return Ok(());
    }

    let now = chrono::Utc::now().to_rfc3339();
    user_permissions::ActiveModel {
        user_id: Set(user_id),
        permission_id: Set(permission_id),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .context("Failed to grant permission")?;

    Ok(())
}

use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};

use super::permission;
use crate::entities::users;

/// User data returned from repository (without sensitive password hash or tokens)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub name: Option<String>,
    pub email: String,
    pub is_active: bool,
    /// `true` when the account has a local password.
    pub has_password: bool,
    pub provider_subject: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            is_active: model.is_active,
            has_password: model.password_hash.is_some(),
            provider_subject: model.provider_subject,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Fields for inserting a new account.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub activation_token: Option<String>,
    pub provider_subject: Option<String>,
}

/// Partial update of the account fields an administrator can edit.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

/// Outcome of an insert that may collide with an existing email.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(User),
    EmailTaken,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Get user by email. Matching is exact.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    /// Get user by email together with the stored password hash
    pub async fn get_by_email_with_password(
        &self,
        email: &str,
    ) -> Result<Option<(User, Option<String>)>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        Ok(user.map(|u| {
            let password_hash = u.password_hash.clone();
            (User::from(u), password_hash)
        }))
    }

    /// Get user by ID together with the stored password hash
    pub async fn get_with_password(&self, id: i32) -> Result<Option<(User, Option<String>)>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        Ok(user.map(|u| {
            let password_hash = u.password_hash.clone();
            (User::from(u), password_hash)
        }))
    }

    /// Whether another account than `except_id` already uses `email`
    pub async fn email_in_use_by_other(&self, email: &str, except_id: i32) -> Result<bool> {
        let count = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .filter(users::Column::Id.ne(except_id))
            .count(&self.conn)
            .await
            .context("Failed to check email usage")?;

        Ok(count > 0)
    }

    pub async fn list_all(&self) -> Result<Vec<User>> {
        let rows = users::Entity::find()
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn count(&self) -> Result<u64> {
        users::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")
    }

    /// Insert a user. A unique-email violation is reported as
    /// [`CreateOutcome::EmailTaken`] rather than an error.
    pub async fn create(&self, new_user: NewUser) -> Result<CreateOutcome> {
        match new_user.into_active_model().insert(&self.conn).await {
            Ok(model) => Ok(CreateOutcome::Created(User::from(model))),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::EmailTaken),
            Err(err) => Err(anyhow::Error::new(err).context("Failed to insert user")),
        }
    }

    /// Insert a user and grant it each `(code, name)` permission, creating
    /// missing permissions. Either everything is written or nothing is.
    pub async fn create_with_permissions(
        &self,
        new_user: NewUser,
        grants: &[(&str, &str)],
    ) -> Result<CreateOutcome> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let model = match new_user.into_active_model().insert(&txn).await {
            Ok(model) => model,
            Err(err) if is_unique_violation(&err) => return Ok(CreateOutcome::EmailTaken),
            Err(err) => return Err(anyhow::Error::new(err).context("Failed to insert user")),
        };

        for (code, name) in grants {
            let granted = permission::find_or_create_in(&txn, code, name).await?;
            permission::grant_in(&txn, model.id, granted.id).await?;
        }

        txn.commit()
            .await
            .context("Failed to commit user creation")?;

        Ok(CreateOutcome::Created(User::from(model)))
    }

    /// Activate the account holding `token` and clear the token in one
    /// statement. Returns `false` when no account holds it.
    pub async fn activate_by_token(&self, token: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = users::Entity::update_many()
            .col_expr(users::Column::IsActive, Expr::value(true))
            .col_expr(users::Column::ActivationToken, Expr::value(Option::<String>::None))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::ActivationToken.eq(token))
            .exec(&self.conn)
            .await
            .context("Failed to redeem activation token")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn set_reset_token(&self, id: i32, token: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        users::Entity::update_many()
            .col_expr(users::Column::ResetToken, Expr::value(token))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to store reset token")?;

        Ok(())
    }

    /// Replace the password of the account holding `token` and clear the
    /// token in one statement. Returns `false` when no account holds it.
    pub async fn reset_password_by_token(&self, token: &str, password_hash: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = users::Entity::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(users::Column::ResetToken, Expr::value(Option::<String>::None))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::ResetToken.eq(token))
            .exec(&self.conn)
            .await
            .context("Failed to redeem reset token")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn update_password(&self, id: i32, password_hash: &str) -> Result<()> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(Some(password_hash.to_string()));
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Apply `changes` to a user. Returns `None` if the user does not exist.
    pub async fn update(&self, id: i32, changes: UserChanges) -> Result<Option<User>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for update")?
        else {
            return Ok(None);
        };

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        if let Some(name) = changes.name {
            active.name = Set(Some(name));
        }
        if let Some(email) = changes.email {
            active.email = Set(email);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(now);

        let model = active.update(&self.conn).await?;
        Ok(Some(User::from(model)))
    }

    /// Test and seeding helper: read the raw tokens of an account.
    pub async fn get_tokens(&self, email: &str) -> Result<Option<(Option<String>, Option<String>)>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user tokens")?;

        Ok(user.map(|u| (u.activation_token, u.reset_token)))
    }
}

impl NewUser {
    fn into_active_model(self) -> users::ActiveModel {
        let now = chrono::Utc::now().to_rfc3339();

        users::ActiveModel {
            provider_subject: Set(self.provider_subject),
            name: Set(self.name),
            email: Set(self.email),
            password_hash: Set(self.password_hash),
            is_active: Set(self.is_active),
            activation_token: Set(self.activation_token),
            reset_token: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use sea_orm::ConnectionTrait;

    const GRANTS: [(&str, &str); 2] = [("user", "User"), ("admin", "Admin")];

    fn admin() -> NewUser {
        NewUser {
            email: "root@x.com".to_string(),
            password_hash: Some("hash".to_string()),
            is_active: true,
            ..NewUser::default()
        }
    }

    #[tokio::test]
    async fn test_create_with_permissions() {
        let store = Store::new("sqlite::memory:").await.unwrap();

        let outcome = store
            .user_repo()
            .create_with_permissions(admin(), &GRANTS)
            .await
            .unwrap();
        let CreateOutcome::Created(user) = outcome else {
            panic!("expected a new user");
        };

        let codes = store.permission_codes_for(user.id).await.unwrap();
        assert_eq!(codes, vec!["admin".to_string(), "user".to_string()]);

        let again = store
            .user_repo()
            .create_with_permissions(admin(), &GRANTS)
            .await
            .unwrap();
        assert!(matches!(again, CreateOutcome::EmailTaken));
    }

    #[tokio::test]
    async fn test_create_with_permissions_rolls_back_user() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        store
            .conn
            .execute_unprepared("DROP TABLE user_permissions")
            .await
            .unwrap();

        let result = store
            .user_repo()
            .create_with_permissions(admin(), &GRANTS)
            .await;

        assert!(result.is_err());
        assert_eq!(store.user_repo().count().await.unwrap(), 0);
    }
}

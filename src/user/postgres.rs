//! Handle database requests.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::error::{Result, ServerError};
use crate::messages::Field;
use crate::user::{Group, Lookup, User, UserRepository};

/// [`UserRepository`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: Pool<Postgres>,
}

impl PostgresUserRepository {
    /// Create a new [`PostgresUserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Turn a unique violation into the field it concerns.
fn map_unique(err: sqlx::Error) -> ServerError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("users_email_key") => Some(Field::Email),
                Some("users_phone_number_key") => Some(Field::PhoneNumber),
                Some("users_id_number_key") => Some(Field::IdNumber),
                _ => None,
            };
            if let Some(field) = field {
                return ServerError::Duplicate(field);
            }
        }
    }

    err.into()
}

fn group_ids(user: &User) -> Vec<i64> {
    user.groups.iter().map(|group| group.id).collect()
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn insert(&self, user: &User) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO users (first_name, last_name, email, phone_number, id_number,
                    profile_picture, password, should_set_password, is_active, is_staff,
                    is_admin, is_superuser)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                RETURNING id"#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.id_number)
        .bind(&user.profile_picture)
        .bind(&user.password)
        .bind(user.should_set_password)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_admin)
        .bind(user.is_superuser)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        sqlx::query(
            r#"INSERT INTO user_groups (user_id, group_id)
                SELECT $1, UNNEST($2::BIGINT[])"#,
        )
        .bind(id)
        .bind(group_ids(user))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.find_by(Lookup::Id(id)).await?.ok_or(ServerError::NotFound)
    }

    async fn find_by(&self, lookup: Lookup<'_>) -> Result<Option<User>> {
        let query = select_query(Some(lookup.column()));
        let query = sqlx::query_as::<_, User>(&query);
        let query = match lookup {
            Lookup::Id(id) => query.bind(id),
            Lookup::Email(value)
            | Lookup::PhoneNumber(value)
            | Lookup::IdNumber(value) => query.bind(value.to_owned()),
        };

        Ok(query.fetch_optional(&self.pool).await?)
    }

    async fn exists_by(
        &self,
        lookup: Lookup<'_>,
        exclude: Option<i64>,
    ) -> Result<bool> {
        let query = format!(
            r#"SELECT EXISTS(
                SELECT 1 FROM users
                WHERE {} = $1 AND ($2::BIGINT IS NULL OR id <> $2)
            )"#,
            lookup.column()
        );
        let query = sqlx::query_scalar::<_, bool>(&query);
        let query = match lookup {
            Lookup::Id(id) => query.bind(id),
            Lookup::Email(value)
            | Lookup::PhoneNumber(value)
            | Lookup::IdNumber(value) => query.bind(value.to_owned()),
        };

        Ok(query.bind(exclude).fetch_one(&self.pool).await?)
    }

    async fn list(&self) -> Result<Vec<User>> {
        let query = select_query(None);

        Ok(sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn save(&self, user: &User) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE users
                SET first_name = $1, last_name = $2, email = $3, phone_number = $4,
                    id_number = $5, profile_picture = $6, password = $7,
                    should_set_password = $8, is_active = $9, is_staff = $10,
                    is_admin = $11, is_superuser = $12, last_login = $13,
                    updated_at = NOW()
                WHERE id = $14"#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.id_number)
        .bind(&user.profile_picture)
        .bind(&user.password)
        .bind(user.should_set_password)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_admin)
        .bind(user.is_superuser)
        .bind(user.last_login)
        .bind(user.id)
        .execute(&mut *tx)
        .await
        .map_err(map_unique)?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(ServerError::NotFound);
        }

        sqlx::query(r#"DELETE FROM user_groups WHERE user_id = $1"#)
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"INSERT INTO user_groups (user_id, group_id)
                SELECT $1, UNNEST($2::BIGINT[])"#,
        )
        .bind(user.id)
        .bind(group_ids(user))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.find_by(Lookup::Id(user.id))
            .await?
            .ok_or(ServerError::NotFound)
    }

    async fn record_login(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query(r#"UPDATE users SET last_login = NOW() WHERE id = $1"#)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_password(
        &self,
        user_id: i64,
        hash: &str,
        should_set_password: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE users
                SET password = $1, should_set_password = $2, updated_at = NOW()
                WHERE id = $3"#,
        )
        .bind(hash)
        .bind(should_set_password)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_groups(&self, ids: &[i64]) -> Result<Vec<Group>> {
        Ok(sqlx::query_as::<_, Group>(
            r#"SELECT id, name FROM groups WHERE id = ANY($1) ORDER BY id"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn permissions_of(&self, user_id: i64) -> Result<HashSet<String>> {
        let permissions = sqlx::query_scalar::<_, String>(
            r#"SELECT permission FROM user_permissions WHERE user_id = $1
                UNION
                SELECT gp.permission FROM group_permissions gp
                JOIN user_groups ug ON ug.group_id = gp.group_id
                WHERE ug.user_id = $1"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions.into_iter().collect())
    }

    async fn create_group(
        &self,
        name: &str,
        permissions: &[String],
    ) -> Result<Group> {
        let mut tx = self.pool.begin().await?;

        let group = sqlx::query_as::<_, Group>(
            r#"INSERT INTO groups (name) VALUES ($1)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id, name"#,
        )
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO group_permissions (group_id, permission)
                SELECT $1, UNNEST($2::VARCHAR[])
                ON CONFLICT DO NOTHING"#,
        )
        .bind(group.id)
        .bind(permissions)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(group)
    }

    async fn grant(&self, user_id: i64, permission: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO user_permissions (user_id, permission) VALUES ($1, $2)
                ON CONFLICT DO NOTHING"#,
        )
        .bind(user_id)
        .bind(permission)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Select users with their groups aggregated as JSON.
fn select_query(column: Option<&str>) -> String {
    let filter = column
        .map(|column| format!("WHERE u.{column} = $1"))
        .unwrap_or_default();

    format!(
        r#"SELECT
                u.id,
                u.first_name,
                u.last_name,
                u.email,
                u.phone_number,
                u.id_number,
                u.profile_picture,
                u.password,
                u.should_set_password,
                u.is_active,
                u.is_staff,
                u.is_admin,
                u.is_superuser,
                u.last_login,
                u.created_at,
                u.updated_at,
                COALESCE(
                    JSONB_AGG(
                        jsonb_build_object('id', g.id, 'name', g.name)
                        ORDER BY g.id
                    ) FILTER (WHERE g.id IS NOT NULL),
                    '[]'
                ) AS groups
            FROM users u
            LEFT JOIN user_groups ug ON ug.user_id = u.id
            LEFT JOIN groups g ON g.id = ug.group_id
            {filter}
            GROUP BY u.id
            ORDER BY u.id
            "#
    )
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::repository::UserRepository;
use gatehouse_core::{CoreError, CoreResult, Role, User};
use gatehouse_shared::Masked;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::storage_error;

pub struct StoreUserRepository {
    pool: PgPool,
}

impl StoreUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = CoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role).map_err(|_| CoreError::Storage(format!("unknown role '{}'", row.role)))?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: Masked::new(row.email),
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl UserRepository for StoreUserRepository {
    async fn create(&self, user: &User) -> CoreResult<Uuid> {
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(user.email.expose())
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match storage_error(e) {
            CoreError::Conflict(_) => CoreError::Conflict("an account with this email already exists".to_string()),
            other => other,
        })?;

        Ok(user.id)
    }

    async fn get(&self, id: Uuid) -> CoreResult<User> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, name, email, password_hash, role, created_at FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        row.ok_or_else(|| CoreError::NotFound(format!("user {}", id)))?.try_into()
    }

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, name, email, password_hash, role, created_at FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        row.map(User::try_from).transpose()
    }
}

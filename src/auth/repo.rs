use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::ApiError;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub avatar_url: Option<String>,
}

const COLUMNS: &str = "id, email, full_name, password_hash, is_active, is_verified, avatar_url";

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Inserts an active, unverified user. A unique violation on the email
    /// surfaces as one domain error with nothing persisted.
    pub async fn create(
        db: &PgPool,
        email: &str,
        full_name: Option<&str>,
        password_hash: &str,
    ) -> Result<User, ApiError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, full_name, password_hash, is_active, is_verified)
            VALUES ($1, $2, $3, TRUE, FALSE)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(email)
        .bind(full_name)
        .bind(password_hash)
        .fetch_one(db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                ApiError::Duplicate("user")
            }
            _ => ApiError::Internal(e.into()),
        })
    }

    pub async fn mark_verified(db: &PgPool, id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET is_verified = TRUE WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Unconditional field update; the URL is not validated for reachability.
    pub async fn set_avatar(db: &PgPool, id: i64, avatar_url: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET avatar_url = $2 WHERE id = $1")
            .bind(id)
            .bind(avatar_url)
            .execute(db)
            .await?;
        Ok(())
    }
}

/// SQLite-backed user directory (mirror of the identity provider)
use crate::{
    db::{self, format_timestamp, parse_timestamp},
    error::{EngineError, EngineResult},
    identity::{IdentityProvider, User},
};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

/// User directory
#[derive(Clone)]
pub struct UserDirectory {
    db: SqlitePool,
}

impl UserDirectory {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert or refresh a mirrored user.
    ///
    /// Called by the identity sync path; `created_at` is kept from the first insert.
    pub async fn upsert_user(
        &self,
        user_id: &str,
        display_name: &str,
        photo_url: Option<&str>,
        premium: bool,
        active: bool,
    ) -> EngineResult<User> {
        let now = format_timestamp(db::now());

        sqlx::query(
            r#"
            INSERT INTO users (id, display_name, photo_url, premium, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                photo_url = excluded.photo_url,
                premium = excluded.premium,
                active = excluded.active
            "#,
        )
        .bind(user_id)
        .bind(display_name)
        .bind(photo_url)
        .bind(premium)
        .bind(active)
        .bind(&now)
        .execute(&self.db)
        .await?;

        self.get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::Internal(format!("User {} vanished after upsert", user_id)))
    }

    /// Update the display data of an existing user
    pub async fn update_profile(
        &self,
        user_id: &str,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> EngineResult<User> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET display_name = ?1, photo_url = ?2
            WHERE id = ?3
            "#,
        )
        .bind(display_name)
        .bind(photo_url)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("User {} not found", user_id)));
        }

        self.get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("User {} not found", user_id)))
    }

    /// Flip the active flag (account deactivation arrives from the identity provider)
    pub async fn set_active(&self, user_id: &str, active: bool) -> EngineResult<()> {
        let result = sqlx::query("UPDATE users SET active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("User {} not found", user_id)));
        }

        Ok(())
    }

    fn parse_user(row: sqlx::sqlite::SqliteRow) -> EngineResult<User> {
        let created_at: String = row.try_get("created_at")?;

        Ok(User {
            id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
            photo_url: row.try_get("photo_url")?,
            premium: row.try_get("premium")?,
            active: row.try_get("active")?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl IdentityProvider for UserDirectory {
    async fn get_user(&self, user_id: &str) -> EngineResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, display_name, photo_url, premium, active, created_at
            FROM users
            WHERE id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::parse_user).transpose()
    }

    async fn discovery_candidates(&self, viewer_id: &str) -> EngineResult<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.display_name, u.photo_url, u.premium, u.active, u.created_at
            FROM users u
            WHERE u.active = 1
              AND u.id <> ?1
              AND NOT EXISTS (SELECT 1 FROM likes l WHERE l.actor_id = ?1 AND l.target_id = u.id)
              AND NOT EXISTS (SELECT 1 FROM passes p WHERE p.actor_id = ?1 AND p.target_id = u.id)
            ORDER BY u.created_at DESC
            "#,
        )
        .bind(viewer_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_user).collect()
    }
}

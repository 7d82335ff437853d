/// Like Ledger: validates and persists directional decisions
use crate::{
    config::QuotaConfig,
    db::{self, format_timestamp, parse_timestamp},
    error::{EngineError, EngineResult},
    identity::{IdentityProvider, User},
    interactions::{LikeKind, LikeRecord, PassRecord, SuperLikeQuota, UtcDay},
};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A stored like together with what was known about the actor when it was written
#[derive(Debug, Clone)]
pub struct AcceptedLike {
    pub record: LikeRecord,
    pub actor: User,
    /// Quota as of this like, counted from the reads made before the insert
    pub quota: SuperLikeQuota,
}

/// Like ledger
#[derive(Clone)]
pub struct LikeLedger {
    db: SqlitePool,
    identity: Arc<dyn IdentityProvider>,
    quota: QuotaConfig,
}

impl LikeLedger {
    pub fn new(db: SqlitePool, identity: Arc<dyn IdentityProvider>, quota: QuotaConfig) -> Self {
        Self { db, identity, quota }
    }

    /// Record a like or super-like from `actor_id` to `target_id`
    pub async fn record_like(
        &self,
        actor_id: &str,
        target_id: &str,
        kind: LikeKind,
    ) -> EngineResult<AcceptedLike> {
        self.record_like_at(actor_id, target_id, kind, db::now()).await
    }

    /// Record a like at an explicit instant (quota day is derived from `now`).
    ///
    /// Every read happens before the insert, so an error means nothing was written.
    pub async fn record_like_at(
        &self,
        actor_id: &str,
        target_id: &str,
        kind: LikeKind,
        now: DateTime<Utc>,
    ) -> EngineResult<AcceptedLike> {
        let actor = self.check_participants(actor_id, target_id).await?;
        let day = UtcDay::containing(now);
        let allowance = self.quota.allowance(actor.premium);
        let used_before = self.count_super_likes(actor_id, day).await?;
        let id = Uuid::new_v4().to_string();

        // Duplicate and pass exclusion plus the daily super-like cap are
        // evaluated inside the insert itself, so concurrent requests cannot
        // both slip past them.
        let result = sqlx::query(
            r#"
            INSERT INTO likes (id, actor_id, target_id, kind, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5
            WHERE NOT EXISTS (
                SELECT 1 FROM likes WHERE actor_id = ?2 AND target_id = ?3
            )
            AND NOT EXISTS (
                SELECT 1 FROM passes WHERE actor_id = ?2 AND target_id = ?3
            )
            AND (
                ?4 <> 'super_like'
                OR (
                    SELECT COUNT(*) FROM likes
                    WHERE actor_id = ?2 AND kind = 'super_like'
                      AND created_at >= ?6 AND created_at < ?7
                ) < ?8
            )
            "#,
        )
        .bind(&id)
        .bind(actor_id)
        .bind(target_id)
        .bind(kind.as_str())
        .bind(format_timestamp(now))
        .bind(format_timestamp(day.start))
        .bind(format_timestamp(day.end))
        .bind(allowance as i64)
        .execute(&self.db)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(e) if EngineError::is_unique_violation(&e) => {
                return Err(EngineError::DuplicateDecision(format!(
                    "{} already liked {}",
                    actor_id, target_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if result.rows_affected() == 0 {
            // Nothing was written; find out which guard rejected the row
            if self.find_like(actor_id, target_id).await?.is_some() {
                return Err(EngineError::DuplicateDecision(format!(
                    "{} already liked {}",
                    actor_id, target_id
                )));
            }

            if self.has_passed(actor_id, target_id).await? {
                return Err(EngineError::DuplicateDecision(format!(
                    "{} already passed on {}",
                    actor_id, target_id
                )));
            }

            let used = self.count_super_likes(actor_id, day).await?;
            return Err(EngineError::QuotaExceeded { used, allowance });
        }

        debug!(actor = actor_id, target = target_id, kind = kind.as_str(), "Like recorded");
        self.spawn_profile_view(actor_id, target_id, now);

        let used = match kind {
            LikeKind::SuperLike => used_before + 1,
            LikeKind::Like => used_before,
        };

        Ok(AcceptedLike {
            record: LikeRecord {
                id,
                actor_id: actor_id.to_string(),
                target_id: target_id.to_string(),
                kind,
                created_at: now,
            },
            quota: SuperLikeQuota::new(allowance, used, day),
            actor,
        })
    }

    /// Record a pass from `actor_id` on `target_id`
    pub async fn record_pass(&self, actor_id: &str, target_id: &str) -> EngineResult<PassRecord> {
        self.check_participants(actor_id, target_id).await?;

        let now = db::now();
        let id = Uuid::new_v4().to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO passes (id, actor_id, target_id, created_at)
            SELECT ?1, ?2, ?3, ?4
            WHERE NOT EXISTS (
                SELECT 1 FROM likes WHERE actor_id = ?2 AND target_id = ?3
            )
            "#,
        )
        .bind(&id)
        .bind(actor_id)
        .bind(target_id)
        .bind(format_timestamp(now))
        .execute(&self.db)
        .await;

        match result {
            Ok(result) if result.rows_affected() == 0 => {
                return Err(EngineError::DuplicateDecision(format!(
                    "{} already liked {}",
                    actor_id, target_id
                )));
            }
            Ok(_) => {}
            Err(e) if EngineError::is_unique_violation(&e) => {
                return Err(EngineError::DuplicateDecision(format!(
                    "{} already passed on {}",
                    actor_id, target_id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        debug!(actor = actor_id, target = target_id, "Pass recorded");
        self.spawn_profile_view(actor_id, target_id, now);

        Ok(PassRecord {
            id,
            actor_id: actor_id.to_string(),
            target_id: target_id.to_string(),
            created_at: now,
        })
    }

    /// Super-like allowance for the UTC day containing `now`
    pub async fn super_like_quota_at(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> EngineResult<SuperLikeQuota> {
        let day = UtcDay::containing(now);
        let used = self.count_super_likes(&user.id, day).await?;
        Ok(SuperLikeQuota::new(self.quota.allowance(user.premium), used, day))
    }

    /// Fetch a like by ordered pair
    pub async fn find_like(&self, actor_id: &str, target_id: &str) -> EngineResult<Option<LikeRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, actor_id, target_id, kind, created_at
            FROM likes
            WHERE actor_id = ?1 AND target_id = ?2
            "#,
        )
        .bind(actor_id)
        .bind(target_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(parse_like).transpose()
    }

    /// Record that `viewer_id` has seen `viewed_id`'s profile. Idempotent.
    pub async fn record_profile_view(
        db: &SqlitePool,
        viewer_id: &str,
        viewed_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO profile_views (viewer_id, viewed_id, viewed_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(viewer_id, viewed_id) DO NOTHING
            "#,
        )
        .bind(viewer_id)
        .bind(viewed_id)
        .bind(format_timestamp(now))
        .execute(db)
        .await?;

        Ok(())
    }

    fn spawn_profile_view(&self, viewer_id: &str, viewed_id: &str, now: DateTime<Utc>) {
        let db = self.db.clone();
        let viewer_id = viewer_id.to_string();
        let viewed_id = viewed_id.to_string();

        tokio::spawn(async move {
            if let Err(e) = Self::record_profile_view(&db, &viewer_id, &viewed_id, now).await {
                warn!(viewer = %viewer_id, viewed = %viewed_id, "Failed to record profile view: {}", e);
            }
        });
    }

    /// Actor must exist and be active, target must exist and be active, and they must differ
    async fn check_participants(&self, actor_id: &str, target_id: &str) -> EngineResult<User> {
        if actor_id == target_id {
            return Err(EngineError::InvalidActor(
                "Users cannot like or pass on themselves".to_string(),
            ));
        }

        let actor = match self.identity.get_user(actor_id).await? {
            Some(actor) if actor.active => actor,
            Some(_) => {
                return Err(EngineError::InvalidActor(format!("User {} is not active", actor_id)))
            }
            None => return Err(EngineError::InvalidActor(format!("Unknown user {}", actor_id))),
        };

        match self.identity.get_user(target_id).await? {
            Some(target) if target.active => Ok(actor),
            _ => Err(EngineError::NotFound(format!("User {} not found", target_id))),
        }
    }

    async fn has_passed(&self, actor_id: &str, target_id: &str) -> EngineResult<bool> {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM passes WHERE actor_id = ?1 AND target_id = ?2")
                .bind(actor_id)
                .bind(target_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(exists.is_some())
    }

    async fn count_super_likes(&self, actor_id: &str, day: UtcDay) -> EngineResult<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM likes
            WHERE actor_id = ?1 AND kind = 'super_like'
              AND created_at >= ?2 AND created_at < ?3
            "#,
        )
        .bind(actor_id)
        .bind(format_timestamp(day.start))
        .bind(format_timestamp(day.end))
        .fetch_one(&self.db)
        .await?;

        Ok(count.max(0) as u32)
    }
}

pub(crate) fn parse_like(row: sqlx::sqlite::SqliteRow) -> EngineResult<LikeRecord> {
    let kind: String = row.try_get("kind")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(LikeRecord {
        id: row.try_get("id")?,
        actor_id: row.try_get("actor_id")?,
        target_id: row.try_get("target_id")?,
        kind: LikeKind::from_str(&kind)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

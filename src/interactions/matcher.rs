/// Match Detector: turns mutual likes into exactly one match and conversation
use crate::{
    conversations::Conversation,
    db::{self, format_timestamp, parse_timestamp},
    error::EngineResult,
    interactions::{CanonicalPair, MatchOutcome, MatchRecord, MatchStatus},
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

/// Match detector
#[derive(Clone)]
pub struct MatchDetector {
    db: SqlitePool,
}

impl MatchDetector {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Run after an accepted like from `actor_id` to `target_id`.
    ///
    /// Safe to call any number of times, from any number of concurrent
    /// requests: the canonical-pair uniqueness constraint lets only one caller
    /// insert, and every caller observes `MatchCreated`.
    pub async fn check_and_create_match(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> EngineResult<MatchOutcome> {
        let reverse: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM likes WHERE actor_id = ?1 AND target_id = ?2")
                .bind(target_id)
                .bind(actor_id)
                .fetch_optional(&self.db)
                .await?;

        if reverse.is_none() {
            debug!(actor = actor_id, target = target_id, "No reverse like, no match");
            return Ok(MatchOutcome::NoMatch);
        }

        let pair = CanonicalPair::new(actor_id, target_id)?;
        self.create_match(&pair).await
    }

    /// Create-if-absent the match and conversation of `pair`, in one transaction
    pub async fn create_match(&self, pair: &CanonicalPair) -> EngineResult<MatchOutcome> {
        let now = format_timestamp(db::now());
        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO matches (id, user_low, user_high, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_low, user_high) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(pair.low())
        .bind(pair.high())
        .bind(MatchStatus::Mutual.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let match_row = sqlx::query(
            r#"
            SELECT id, user_low, user_high, status, created_at
            FROM matches
            WHERE user_low = ?1 AND user_high = ?2
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_one(&mut *tx)
        .await?;
        let record = parse_match(&match_row)?;

        // Conflict-ignoring as well, so a retry repairs a missing conversation
        sqlx::query(
            r#"
            INSERT INTO conversations (id, match_id, user_low, user_high, created_at, last_activity_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(user_low, user_high) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.id)
        .bind(pair.low())
        .bind(pair.high())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let conversation_row = sqlx::query(
            r#"
            SELECT id, match_id, user_low, user_high, created_at, last_activity_at
            FROM conversations
            WHERE user_low = ?1 AND user_high = ?2
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_one(&mut *tx)
        .await?;
        let conversation = Conversation::from_row(&conversation_row)?;

        tx.commit().await?;

        let first_time = inserted == 1;
        if first_time {
            info!(user_low = pair.low(), user_high = pair.high(), match_id = %record.id, "Match created");
        } else {
            debug!(user_low = pair.low(), user_high = pair.high(), "Match already existed");
        }

        Ok(MatchOutcome::MatchCreated {
            record,
            conversation,
            first_time,
        })
    }

    /// Look up the match of a pair
    pub async fn find_match(&self, pair: &CanonicalPair) -> EngineResult<Option<MatchRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_low, user_high, status, created_at
            FROM matches
            WHERE user_low = ?1 AND user_high = ?2
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(parse_match).transpose()
    }

    /// Matches of a user, newest first
    pub async fn list_matches_for(&self, user_id: &str) -> EngineResult<Vec<MatchRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_low, user_high, status, created_at
            FROM matches
            WHERE user_low = ?1 OR user_high = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_match).collect()
    }

    /// Mutual like pairs still missing their match or conversation
    pub async fn find_unreconciled(&self, limit: i64) -> EngineResult<Vec<CanonicalPair>> {
        let rows = sqlx::query(
            r#"
            SELECT l1.actor_id AS user_low, l1.target_id AS user_high
            FROM likes l1
            JOIN likes l2 ON l2.actor_id = l1.target_id AND l2.target_id = l1.actor_id
            WHERE l1.actor_id < l1.target_id
              AND NOT EXISTS (
                  SELECT 1 FROM conversations c
                  WHERE c.user_low = l1.actor_id AND c.user_high = l1.target_id
              )
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let low: String = row.try_get("user_low")?;
                let high: String = row.try_get("user_high")?;
                CanonicalPair::new(&low, &high)
            })
            .collect()
    }
}

fn parse_match(row: &sqlx::sqlite::SqliteRow) -> EngineResult<MatchRecord> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(MatchRecord {
        id: row.try_get("id")?,
        user_low: row.try_get("user_low")?,
        user_high: row.try_get("user_high")?,
        status: MatchStatus::from_str(&status)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

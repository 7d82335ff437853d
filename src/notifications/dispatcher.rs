/// Notification persistence and fan-out
use crate::{
    db::{self, format_timestamp, parse_timestamp},
    error::{EngineError, EngineResult},
    identity::ActorSummary,
    notifications::{NotificationEvent, NotificationKind, NotificationPayload},
};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;

/// Notification dispatcher
#[derive(Clone)]
pub struct NotificationDispatcher {
    db: SqlitePool,
    events_tx: broadcast::Sender<NotificationEvent>,
}

impl NotificationDispatcher {
    pub fn new(db: SqlitePool, broadcast_capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self { db, events_tx }
    }

    /// Subscribe to every newly stored notification
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events_tx.subscribe()
    }

    /// Store a notification for `recipient_id` and publish it.
    ///
    /// Failures come back as `NotificationDispatchFailed`; the interaction
    /// engine logs them and never lets them fail the originating action.
    pub async fn emit(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        payload: NotificationPayload,
    ) -> EngineResult<NotificationEvent> {
        let event = NotificationEvent {
            id: Uuid::new_v4().to_string(),
            recipient_id: recipient_id.to_string(),
            kind,
            payload,
            created_at: db::now(),
            read: false,
        };

        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient_id, kind, actor_id, actor_display_name,
                                       actor_photo_url, match_id, conversation_id, created_at, read)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)
            "#,
        )
        .bind(&event.id)
        .bind(&event.recipient_id)
        .bind(kind.as_str())
        .bind(&event.payload.actor.id)
        .bind(&event.payload.actor.display_name)
        .bind(&event.payload.actor.photo_url)
        .bind(&event.payload.match_id)
        .bind(&event.payload.conversation_id)
        .bind(format_timestamp(event.created_at))
        .execute(&self.db)
        .await
        .map_err(|e| EngineError::NotificationDispatchFailed(e.to_string()))?;

        // Nobody listening is not a failure
        let _ = self.events_tx.send(event.clone());

        Ok(event)
    }

    /// Notifications of a recipient, newest first
    pub async fn list_for(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: Option<i64>,
    ) -> EngineResult<Vec<NotificationEvent>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);

        let rows = sqlx::query(
            r#"
            SELECT id, recipient_id, kind, actor_id, actor_display_name, actor_photo_url,
                   match_id, conversation_id, created_at, read
            FROM notifications
            WHERE recipient_id = ?1 AND (?2 = 0 OR read = 0)
            ORDER BY created_at DESC, id DESC
            LIMIT ?3
            "#,
        )
        .bind(recipient_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_notification).collect()
    }

    /// Number of unread notifications
    pub async fn unread_count(&self, recipient_id: &str) -> EngineResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND read = 0",
        )
        .bind(recipient_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Mark one notification read. Only its recipient may do so.
    pub async fn mark_read(&self, recipient_id: &str, notification_id: &str) -> EngineResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
        )
        .bind(notification_id)
        .bind(recipient_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "Notification {} not found",
                notification_id
            )));
        }

        Ok(())
    }

    /// Mark every notification of a recipient read; returns how many changed
    pub async fn mark_all_read(&self, recipient_id: &str) -> EngineResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = 1 WHERE recipient_id = ?1 AND read = 0",
        )
        .bind(recipient_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete read notifications created before `cutoff`
    pub async fn purge_read_before(&self, cutoff: DateTime<Utc>) -> EngineResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE read = 1 AND created_at < ?1")
            .bind(format_timestamp(cutoff))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

fn parse_notification(row: &sqlx::sqlite::SqliteRow) -> EngineResult<NotificationEvent> {
    let kind: String = row.try_get("kind")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(NotificationEvent {
        id: row.try_get("id")?,
        recipient_id: row.try_get("recipient_id")?,
        kind: NotificationKind::from_str(&kind)?,
        payload: NotificationPayload {
            actor: ActorSummary {
                id: row.try_get("actor_id")?,
                display_name: row.try_get("actor_display_name")?,
                photo_url: row.try_get("actor_photo_url")?,
            },
            match_id: row.try_get("match_id")?,
            conversation_id: row.try_get("conversation_id")?,
        },
        created_at: parse_timestamp(&created_at)?,
        read: row.try_get("read")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::create_memory_pool, identity::UserDirectory};

    async fn setup() -> NotificationDispatcher {
        let db = create_memory_pool().await.unwrap();
        let directory = UserDirectory::new(db.clone());
        for id in ["alice", "bob"] {
            directory.upsert_user(id, id, None, false, true).await.unwrap();
        }
        NotificationDispatcher::new(db, 16)
    }

    fn from(actor: &str) -> NotificationPayload {
        NotificationPayload {
            actor: ActorSummary {
                id: actor.to_string(),
                display_name: actor.to_uppercase(),
                photo_url: None,
            },
            match_id: None,
            conversation_id: None,
        }
    }

    #[tokio::test]
    async fn test_emit_persists_and_publishes() {
        let dispatcher = setup().await;
        let mut rx = dispatcher.subscribe();

        let event = dispatcher
            .emit("bob", NotificationKind::SuperLike, from("alice"))
            .await
            .unwrap();

        let published = rx.recv().await.unwrap();
        assert_eq!(published, event);

        let stored = dispatcher.list_for("bob", false, None).await.unwrap();
        assert_eq!(stored, vec![event]);
        assert!(dispatcher.list_for("alice", false, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_is_scoped_to_recipient() {
        let dispatcher = setup().await;
        let event = dispatcher
            .emit("bob", NotificationKind::Like, from("alice"))
            .await
            .unwrap();

        let err = dispatcher.mark_read("alice", &event.id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(dispatcher.unread_count("bob").await.unwrap(), 1);

        dispatcher.mark_read("bob", &event.id).await.unwrap();
        assert_eq!(dispatcher.unread_count("bob").await.unwrap(), 0);
        assert!(dispatcher.list_for("bob", true, None).await.unwrap().is_empty());
        assert!(dispatcher.list_for("bob", false, None).await.unwrap()[0].read);
    }

    #[tokio::test]
    async fn test_mark_all_and_purge() {
        let dispatcher = setup().await;
        dispatcher.emit("bob", NotificationKind::Like, from("alice")).await.unwrap();
        dispatcher.emit("bob", NotificationKind::Match, from("alice")).await.unwrap();
        dispatcher.emit("alice", NotificationKind::Match, from("bob")).await.unwrap();

        assert_eq!(dispatcher.mark_all_read("bob").await.unwrap(), 2);
        assert_eq!(dispatcher.mark_all_read("bob").await.unwrap(), 0);

        let purged = dispatcher
            .purge_read_before(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 2);
        // Unread notifications survive retention
        assert_eq!(dispatcher.list_for("alice", false, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_dispatch_failure() {
        let dispatcher = setup().await;
        sqlx::query("DROP TABLE notifications")
            .execute(&dispatcher.db)
            .await
            .unwrap();

        let err = dispatcher
            .emit("bob", NotificationKind::Like, from("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotificationDispatchFailed(_)));
    }
}

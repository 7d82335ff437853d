/// Conversation store
use crate::{
    conversations::{Conversation, ConversationSummary, Message, MessageEvent, MAX_MESSAGE_LENGTH},
    db::{self, format_timestamp, parse_timestamp},
    error::{EngineError, EngineResult},
};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;

/// Conversation store
#[derive(Clone)]
pub struct ConversationStore {
    db: SqlitePool,
    messages_tx: broadcast::Sender<MessageEvent>,
}

impl ConversationStore {
    pub fn new(db: SqlitePool, broadcast_capacity: usize) -> Self {
        let (messages_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self { db, messages_tx }
    }

    /// Subscribe to newly sent messages
    pub fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.messages_tx.subscribe()
    }

    /// Get a conversation by id
    pub async fn get(&self, conversation_id: &str) -> EngineResult<Option<Conversation>> {
        let row = sqlx::query(
            r#"
            SELECT id, match_id, user_low, user_high, created_at, last_activity_at
            FROM conversations
            WHERE id = ?1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Conversation::from_row).transpose()
    }

    /// Conversations of `user_id`, most recently active first
    pub async fn list_for(&self, user_id: &str) -> EngineResult<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.match_id, c.user_low, c.user_high, c.created_at, c.last_activity_at,
                   m.id AS m_id, m.sender_id AS m_sender_id, m.body AS m_body,
                   m.created_at AS m_created_at
            FROM conversations c
            LEFT JOIN messages m ON m.id = (
                SELECT id FROM messages
                WHERE conversation_id = c.id
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            )
            WHERE c.user_low = ?1 OR c.user_high = ?1
            ORDER BY c.last_activity_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let conversation = Conversation::from_row(&row)?;
            let counterpart_id = conversation
                .counterpart(user_id)
                .unwrap_or_default()
                .to_string();

            let last_message = match row.try_get::<Option<String>, _>("m_id")? {
                Some(id) => {
                    let created_at: String = row.try_get("m_created_at")?;
                    Some(Message {
                        id,
                        conversation_id: conversation.id.clone(),
                        sender_id: row.try_get("m_sender_id")?,
                        body: row.try_get("m_body")?,
                        created_at: parse_timestamp(&created_at)?,
                    })
                }
                None => None,
            };

            summaries.push(ConversationSummary {
                conversation,
                counterpart_id,
                last_message,
            });
        }

        Ok(summaries)
    }

    /// Send a message into a conversation the sender participates in
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> EngineResult<Message> {
        let body = body.trim();
        if body.is_empty() {
            return Err(EngineError::Validation("Message body cannot be empty".to_string()));
        }
        if body.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(EngineError::Validation(format!(
                "Message body exceeds {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }

        let conversation = self.participant_conversation(conversation_id, sender_id).await?;

        let now = db::now();
        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            created_at: now,
        };

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, body, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.body)
        .bind(format_timestamp(now))
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET last_activity_at = ?1 WHERE id = ?2")
            .bind(format_timestamp(now))
            .bind(&conversation.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(conversation = %conversation.id, sender = sender_id, "Message sent");

        // No subscribers is fine
        let _ = self.messages_tx.send(MessageEvent {
            message: message.clone(),
            participants: [conversation.user_low, conversation.user_high],
        });

        Ok(message)
    }

    /// Messages of a conversation, newest first, optionally before a timestamp
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: Option<i64>,
        before: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<Message>> {
        self.participant_conversation(conversation_id, user_id).await?;

        let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);

        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, body, created_at
            FROM messages
            WHERE conversation_id = ?1 AND (?2 IS NULL OR created_at < ?2)
            ORDER BY created_at DESC, id DESC
            LIMIT ?3
            "#,
        )
        .bind(conversation_id)
        .bind(before.map(format_timestamp))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Message::from_row).collect()
    }

    async fn participant_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> EngineResult<Conversation> {
        let conversation = self
            .get(conversation_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Conversation {} not found", conversation_id)))?;

        if !conversation.has_participant(user_id) {
            return Err(EngineError::Forbidden(
                "Not a participant of this conversation".to_string(),
            ));
        }

        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::create_memory_pool,
        identity::UserDirectory,
        interactions::{CanonicalPair, MatchDetector, MatchOutcome},
    };

    async fn setup() -> (ConversationStore, Conversation) {
        let db = create_memory_pool().await.unwrap();
        let directory = UserDirectory::new(db.clone());
        for id in ["alice", "bob", "mallory"] {
            directory.upsert_user(id, id, None, false, true).await.unwrap();
        }

        let detector = MatchDetector::new(db.clone());
        let pair = CanonicalPair::new("alice", "bob").unwrap();
        let conversation = match detector.create_match(&pair).await.unwrap() {
            MatchOutcome::MatchCreated { conversation, .. } => conversation,
            MatchOutcome::NoMatch => panic!("expected a match"),
        };

        (ConversationStore::new(db, 16), conversation)
    }

    #[tokio::test]
    async fn test_send_and_list_messages() {
        let (store, conversation) = setup().await;

        store.send_message(&conversation.id, "alice", "hi!").await.unwrap();
        let reply = store.send_message(&conversation.id, "bob", "  hello  ").await.unwrap();
        assert_eq!(reply.body, "hello");

        let messages = store.list_messages(&conversation.id, "alice", None, None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender_id, "bob");

        let older = store
            .list_messages(&conversation.id, "bob", None, Some(reply.created_at))
            .await
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].sender_id, "alice");
    }

    #[tokio::test]
    async fn test_non_participant_is_forbidden() {
        let (store, conversation) = setup().await;

        let err = store.send_message(&conversation.id, "mallory", "hey").await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));

        let err = store.list_messages(&conversation.id, "mallory", None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));

        let err = store.send_message("missing", "alice", "hey").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_message_validation() {
        let (store, conversation) = setup().await;

        assert!(store.send_message(&conversation.id, "alice", "   ").await.is_err());
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(store.send_message(&conversation.id, "alice", &long).await.is_err());
    }

    #[tokio::test]
    async fn test_list_for_tracks_activity_and_preview() {
        let (store, conversation) = setup().await;
        let mut rx = store.subscribe();

        let listed = store.list_for("bob").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].counterpart_id, "alice");
        assert!(listed[0].last_message.is_none());

        let message = store.send_message(&conversation.id, "alice", "coffee?").await.unwrap();

        let listed = store.list_for("alice").await.unwrap();
        assert_eq!(listed[0].last_message.as_ref().unwrap().id, message.id);
        assert!(listed[0].conversation.last_activity_at >= conversation.last_activity_at);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.message.id, message.id);
        assert!(event.participants.contains(&"bob".to_string()));

        assert!(store.list_for("mallory").await.unwrap().is_empty());
    }
}

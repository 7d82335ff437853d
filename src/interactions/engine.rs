/// Interaction engine: the single entry point for likes, passes, matches and
/// the read side (feeds, conversations, notifications) built on top of them.
use crate::{
    config::{DiscoveryConfig, QuotaConfig},
    conversations::{ConversationStore, ConversationSummary, Message},
    db,
    error::{EngineError, EngineResult},
    identity::{ActorSummary, IdentityProvider, User},
    interactions::{
        AcceptedLike, LikeKind, LikeLedger, LikeRecord, MatchDetector, MatchOutcome, MatchRecord, PassRecord,
        SuperLikeQuota,
    },
    metrics,
    notifications::{NotificationDispatcher, NotificationEvent, NotificationKind, NotificationPayload},
};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The match a like completed, as seen by the liker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub match_id: String,
    pub conversation_id: String,
    pub counterpart: ActorSummary,
}

/// Result of an accepted like
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub like: LikeRecord,
    pub super_like: bool,
    pub super_likes_remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<MatchSummary>,
}

/// Interaction engine
#[derive(Clone)]
pub struct InteractionEngine {
    identity: Arc<dyn IdentityProvider>,
    ledger: LikeLedger,
    detector: MatchDetector,
    dispatcher: Arc<NotificationDispatcher>,
    conversations: Arc<ConversationStore>,
    discovery: DiscoveryConfig,
}

impl InteractionEngine {
    pub fn new(
        db: SqlitePool,
        identity: Arc<dyn IdentityProvider>,
        quota: QuotaConfig,
        discovery: DiscoveryConfig,
        dispatcher: Arc<NotificationDispatcher>,
        conversations: Arc<ConversationStore>,
    ) -> Self {
        Self {
            ledger: LikeLedger::new(db.clone(), identity.clone(), quota),
            detector: MatchDetector::new(db),
            identity,
            dispatcher,
            conversations,
            discovery,
        }
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Record a like or super-like, detect a match, and notify.
    ///
    /// Once the like is stored the call succeeds: nothing after the insert reads
    /// storage fallibly, a failed match check is left to reconciliation and a
    /// failed notification is only logged.
    pub async fn record_like(
        &self,
        actor_id: &str,
        target_id: &str,
        kind: LikeKind,
    ) -> EngineResult<LikeOutcome> {
        let AcceptedLike {
            record: like,
            actor,
            quota,
        } = self
            .ledger
            .record_like(actor_id, target_id, kind)
            .await
            .map_err(count_decline)?;
        metrics::record_decision(kind.as_str());

        let outcome = match self.detector.check_and_create_match(actor_id, target_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    actor = actor_id,
                    target = target_id,
                    "Match check failed, leaving it to reconciliation: {}",
                    e
                );
                return Ok(LikeOutcome {
                    like,
                    super_like: kind == LikeKind::SuperLike,
                    super_likes_remaining: quota.remaining,
                    matched: None,
                });
            }
        };

        let matched = match outcome {
            MatchOutcome::NoMatch => {
                let notification_kind = match kind {
                    LikeKind::Like => NotificationKind::Like,
                    LikeKind::SuperLike => NotificationKind::SuperLike,
                };
                self.notify(
                    target_id,
                    notification_kind,
                    NotificationPayload {
                        actor: ActorSummary::from(&actor),
                        match_id: None,
                        conversation_id: None,
                    },
                )
                .await;
                None
            }
            MatchOutcome::MatchCreated {
                record,
                conversation,
                first_time,
            } => {
                let counterpart = self.summary_of(target_id).await;
                if first_time {
                    metrics::record_match_created("request");
                    self.notify_match(&record, &conversation.id, &ActorSummary::from(&actor), &counterpart)
                        .await;
                } else {
                    debug!(match_id = %record.id, "Match replayed, notifications already sent");
                }

                Some(MatchSummary {
                    match_id: record.id,
                    conversation_id: conversation.id,
                    counterpart,
                })
            }
        };

        Ok(LikeOutcome {
            like,
            super_like: kind == LikeKind::SuperLike,
            super_likes_remaining: quota.remaining,
            matched,
        })
    }

    /// Record a pass. No quota, no match check, no notification.
    pub async fn record_pass(&self, actor_id: &str, target_id: &str) -> EngineResult<PassRecord> {
        let pass = self
            .ledger
            .record_pass(actor_id, target_id)
            .await
            .map_err(count_decline)?;
        metrics::record_decision("pass");
        Ok(pass)
    }

    /// A shuffled page of users `user_id` has not decided on yet
    pub async fn discover(&self, user_id: &str, limit: Option<i64>) -> EngineResult<Vec<ActorSummary>> {
        let user = self.require_user(user_id).await?;
        if !user.active {
            return Err(EngineError::InvalidActor(format!("User {} is not active", user_id)));
        }

        let limit = limit
            .unwrap_or(self.discovery.default_limit)
            .clamp(1, self.discovery.max_limit) as usize;

        let mut candidates = self.identity.discovery_candidates(user_id).await?;
        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(limit);

        Ok(candidates.iter().map(ActorSummary::from).collect())
    }

    /// Today's super-like allowance for `user_id`
    pub async fn super_like_quota(&self, user_id: &str) -> EngineResult<SuperLikeQuota> {
        let user = self.require_user(user_id).await?;
        self.ledger.super_like_quota_at(&user, db::now()).await
    }

    pub async fn list_matches_for(&self, user_id: &str) -> EngineResult<Vec<MatchRecord>> {
        self.detector.list_matches_for(user_id).await
    }

    pub async fn list_conversations_for(&self, user_id: &str) -> EngineResult<Vec<ConversationSummary>> {
        self.conversations.list_for(user_id).await
    }

    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> EngineResult<Message> {
        self.conversations.send_message(conversation_id, sender_id, body).await
    }

    pub async fn list_messages(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: Option<i64>,
        before: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<Message>> {
        self.conversations
            .list_messages(conversation_id, user_id, limit, before)
            .await
    }

    pub async fn list_notifications_for(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: Option<i64>,
    ) -> EngineResult<Vec<NotificationEvent>> {
        self.dispatcher.list_for(user_id, unread_only, limit).await
    }

    pub async fn unread_notification_count(&self, user_id: &str) -> EngineResult<i64> {
        self.dispatcher.unread_count(user_id).await
    }

    pub async fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> EngineResult<()> {
        self.dispatcher.mark_read(user_id, notification_id).await
    }

    pub async fn mark_all_notifications_read(&self, user_id: &str) -> EngineResult<u64> {
        self.dispatcher.mark_all_read(user_id).await
    }

    /// Re-run the match check for mutual likes missing their match or
    /// conversation. Returns how many pairs were repaired.
    pub async fn reconcile_matches(&self, limit: i64) -> EngineResult<usize> {
        let pairs = self.detector.find_unreconciled(limit).await?;
        let mut repaired = 0;

        for pair in pairs {
            match self.detector.create_match(&pair).await {
                Ok(MatchOutcome::MatchCreated {
                    record,
                    conversation,
                    first_time,
                }) => {
                    repaired += 1;
                    if first_time {
                        metrics::record_match_created("reconcile");
                        let low = self.summary_of(pair.low()).await;
                        let high = self.summary_of(pair.high()).await;
                        self.notify_match(&record, &conversation.id, &low, &high).await;
                    }
                }
                Ok(MatchOutcome::NoMatch) => {}
                Err(e) => {
                    warn!(
                        user_low = pair.low(),
                        user_high = pair.high(),
                        "Failed to reconcile match: {}",
                        e
                    );
                }
            }
        }

        if repaired > 0 {
            info!(repaired, "Reconciled matches");
        }

        Ok(repaired)
    }

    async fn require_user(&self, user_id: &str) -> EngineResult<User> {
        self.identity
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::InvalidActor(format!("Unknown user {}", user_id)))
    }

    /// Display data for a payload; falls back to the bare id if the user vanished
    async fn summary_of(&self, user_id: &str) -> ActorSummary {
        match self.identity.get_user(user_id).await {
            Ok(Some(user)) => ActorSummary::from(&user),
            _ => ActorSummary {
                id: user_id.to_string(),
                display_name: user_id.to_string(),
                photo_url: None,
            },
        }
    }

    /// One `match` notification to each participant, naming the other one
    async fn notify_match(
        &self,
        record: &MatchRecord,
        conversation_id: &str,
        a: &ActorSummary,
        b: &ActorSummary,
    ) {
        for (recipient, counterpart) in [(a, b), (b, a)] {
            self.notify(
                &recipient.id,
                NotificationKind::Match,
                NotificationPayload {
                    actor: counterpart.clone(),
                    match_id: Some(record.id.clone()),
                    conversation_id: Some(conversation_id.to_string()),
                },
            )
            .await;
        }
    }

    async fn notify(&self, recipient_id: &str, kind: NotificationKind, payload: NotificationPayload) {
        match self.dispatcher.emit(recipient_id, kind, payload).await {
            Ok(_) => metrics::record_notification(kind.as_str(), true),
            Err(e) => {
                metrics::record_notification(kind.as_str(), false);
                warn!(recipient = recipient_id, kind = kind.as_str(), "{}", e);
            }
        }
    }
}

fn count_decline(e: EngineError) -> EngineError {
    if let Some(reason) = e.decline_reason() {
        metrics::record_decline(reason.as_str());
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::create_memory_pool, identity::UserDirectory};

    struct Harness {
        engine: InteractionEngine,
        directory: UserDirectory,
        db: SqlitePool,
    }

    async fn setup() -> Harness {
        let db = create_memory_pool().await.unwrap();
        let directory = UserDirectory::new(db.clone());
        for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
            directory.upsert_user(id, name, None, false, true).await.unwrap();
        }

        let engine = InteractionEngine::new(
            db.clone(),
            Arc::new(directory.clone()),
            QuotaConfig::default(),
            DiscoveryConfig::default(),
            Arc::new(NotificationDispatcher::new(db.clone(), 64)),
            Arc::new(ConversationStore::new(db.clone(), 64)),
        );

        Harness { engine, directory, db }
    }

    /// Notification kinds received by `user_id`, sorted by name
    async fn kinds_for(engine: &InteractionEngine, user_id: &str) -> Vec<NotificationKind> {
        let mut kinds: Vec<_> = engine
            .list_notifications_for(user_id, false, None)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    async fn count(db: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_one_sided_like_notifies_target_once() {
        let h = setup().await;

        let outcome = h.engine.record_like("alice", "bob", LikeKind::Like).await.unwrap();
        assert!(outcome.matched.is_none());
        assert!(!outcome.super_like);

        assert_eq!(kinds_for(&h.engine, "bob").await, vec![NotificationKind::Like]);
        assert!(kinds_for(&h.engine, "alice").await.is_empty());

        let bob_notes = h.engine.list_notifications_for("bob", false, None).await.unwrap();
        assert_eq!(bob_notes[0].payload.actor.display_name, "Alice");
    }

    #[tokio::test]
    async fn test_super_like_replaces_like_notification() {
        let h = setup().await;

        let outcome = h.engine.record_like("alice", "bob", LikeKind::SuperLike).await.unwrap();
        assert!(outcome.super_like);
        assert_eq!(outcome.super_likes_remaining, 0);

        assert_eq!(kinds_for(&h.engine, "bob").await, vec![NotificationKind::SuperLike]);
    }

    #[tokio::test]
    async fn test_completing_like_sends_two_match_notifications() {
        let h = setup().await;

        h.engine.record_like("alice", "bob", LikeKind::Like).await.unwrap();
        let outcome = h.engine.record_like("bob", "alice", LikeKind::Like).await.unwrap();

        let matched = outcome.matched.unwrap();
        assert_eq!(matched.counterpart.id, "alice");

        // Bob keeps the like from Alice's first action; the completing action adds only matches
        assert_eq!(
            kinds_for(&h.engine, "bob").await,
            vec![NotificationKind::Like, NotificationKind::Match]
        );
        assert_eq!(kinds_for(&h.engine, "alice").await, vec![NotificationKind::Match]);

        let alice_note = &h.engine.list_notifications_for("alice", false, None).await.unwrap()[0];
        assert_eq!(alice_note.payload.actor.id, "bob");
        assert_eq!(alice_note.payload.conversation_id.as_deref(), Some(matched.conversation_id.as_str()));

        assert_eq!(count(&h.db, "matches").await, 1);
        assert_eq!(count(&h.db, "conversations").await, 1);
        assert_eq!(h.engine.list_conversations_for("alice").await.unwrap().len(), 1);
        assert_eq!(h.engine.list_matches_for("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_quota_scenario() {
        let h = setup().await;

        let outcome = h.engine.record_like("alice", "bob", LikeKind::SuperLike).await.unwrap();
        assert_eq!(outcome.super_likes_remaining, 0);

        let err = h
            .engine
            .record_like("alice", "carol", LikeKind::SuperLike)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::QuotaExceeded { .. }));

        h.engine.record_like("alice", "carol", LikeKind::Like).await.unwrap();

        let quota = h.engine.super_like_quota("alice").await.unwrap();
        assert_eq!(quota.used, 1);
        assert!(quota.exhausted());
    }

    #[tokio::test]
    async fn test_pass_then_like_is_declined_and_hidden_from_discovery() {
        let h = setup().await;

        h.engine.record_pass("alice", "bob").await.unwrap();
        let err = h.engine.record_like("alice", "bob", LikeKind::Like).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateDecision(_)));

        let feed = h.engine.discover("alice", None).await.unwrap();
        let ids: Vec<_> = feed.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["carol"]);
        assert!(kinds_for(&h.engine, "bob").await.is_empty());
    }

    #[tokio::test]
    async fn test_discover_limits_and_rejects_inactive_viewer() {
        let h = setup().await;

        let feed = h.engine.discover("alice", Some(1)).await.unwrap();
        assert_eq!(feed.len(), 1);

        h.directory.set_active("alice", false).await.unwrap();
        let err = h.engine.discover("alice", None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidActor(_)));
    }

    /// Serves the first `allowed` lookups, then reports the store as unavailable
    struct FlakyIdentity {
        inner: UserDirectory,
        allowed: usize,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl IdentityProvider for FlakyIdentity {
        async fn get_user(&self, user_id: &str) -> EngineResult<Option<User>> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n >= self.allowed {
                return Err(EngineError::StorageUnavailable(sqlx::Error::PoolTimedOut));
            }
            self.inner.get_user(user_id).await
        }

        async fn discovery_candidates(&self, viewer_id: &str) -> EngineResult<Vec<User>> {
            self.inner.discovery_candidates(viewer_id).await
        }
    }

    #[tokio::test]
    async fn test_stored_like_completes_without_further_lookups() {
        let h = setup().await;

        // Only the actor and target checks made before the insert may succeed
        let identity = Arc::new(FlakyIdentity {
            inner: h.directory.clone(),
            allowed: 2,
            calls: Default::default(),
        });
        let engine = InteractionEngine::new(
            h.db.clone(),
            identity,
            QuotaConfig::default(),
            DiscoveryConfig::default(),
            Arc::new(NotificationDispatcher::new(h.db.clone(), 64)),
            Arc::new(ConversationStore::new(h.db.clone(), 64)),
        );

        let outcome = engine.record_like("alice", "bob", LikeKind::SuperLike).await.unwrap();
        assert!(outcome.super_like);
        assert_eq!(outcome.super_likes_remaining, 0);

        assert_eq!(kinds_for(&h.engine, "bob").await, vec![NotificationKind::SuperLike]);
        let bob_notes = h.engine.list_notifications_for("bob", false, None).await.unwrap();
        assert_eq!(bob_notes[0].payload.actor.display_name, "Alice");
    }

    #[tokio::test]
    async fn test_repeated_super_like_is_declined_as_duplicate() {
        let h = setup().await;

        h.engine.record_like("alice", "bob", LikeKind::SuperLike).await.unwrap();
        let err = h
            .engine
            .record_like("alice", "bob", LikeKind::SuperLike)
            .await
            .unwrap_err();

        assert_eq!(err.decline_reason(), Some(crate::error::DeclineReason::DuplicateDecision));
        assert_eq!(kinds_for(&h.engine, "bob").await, vec![NotificationKind::SuperLike]);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_like() {
        let h = setup().await;
        sqlx::query("DROP TABLE notifications").execute(&h.db).await.unwrap();

        h.engine.record_like("alice", "bob", LikeKind::Like).await.unwrap();
        let outcome = h.engine.record_like("bob", "alice", LikeKind::Like).await.unwrap();

        assert!(outcome.matched.is_some());
        assert_eq!(count(&h.db, "matches").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_mutual_likes_create_one_match() {
        let h = setup().await;

        let a = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.record_like("alice", "bob", LikeKind::Like).await })
        };
        let b = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.record_like("bob", "alice", LikeKind::Like).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert!(a.matched.is_some() || b.matched.is_some());

        assert_eq!(count(&h.db, "matches").await, 1);
        assert_eq!(count(&h.db, "conversations").await, 1);

        let matches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE kind = 'match'")
            .fetch_one(&h.db)
            .await
            .unwrap();
        assert_eq!(matches, 2);
    }

    #[tokio::test]
    async fn test_reconcile_repairs_and_notifies_once() {
        let h = setup().await;
        let ledger = LikeLedger::new(h.db.clone(), Arc::new(h.directory.clone()), QuotaConfig::default());

        // Mutual likes written without running the match step
        ledger.record_like("alice", "carol", LikeKind::Like).await.unwrap();
        ledger.record_like("carol", "alice", LikeKind::Like).await.unwrap();

        assert_eq!(h.engine.reconcile_matches(100).await.unwrap(), 1);
        assert_eq!(count(&h.db, "matches").await, 1);
        assert_eq!(kinds_for(&h.engine, "alice").await, vec![NotificationKind::Match]);
        assert_eq!(kinds_for(&h.engine, "carol").await, vec![NotificationKind::Match]);

        assert_eq!(h.engine.reconcile_matches(100).await.unwrap(), 0);
        assert_eq!(kinds_for(&h.engine, "carol").await.len(), 1);
    }
}

/// Interaction scenarios against a file-backed, multi-connection pool
use tandem::{
    db::{create_pool, run_migrations, DatabaseOptions},
    interactions::LikeKind,
    AppContext, ServerConfig,
};

const SECRET: &str = "0123456789abcdef0123456789abcdef";

async fn file_context(dir: &tempfile::TempDir, users: &[&str]) -> AppContext {
    let path = dir.path().join("tandem.sqlite");
    let pool = create_pool(&path, DatabaseOptions::default()).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let ctx = AppContext::with_pool(ServerConfig::for_testing(SECRET), pool);
    for id in users {
        ctx.users.upsert_user(id, id, None, false, true).await.unwrap();
    }
    ctx
}

async fn count(ctx: &AppContext, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(&ctx.db).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutual_likes_yield_one_match_per_pair() {
    let dir = tempfile::tempdir().unwrap();
    let users = ["u1", "u2", "u3", "u4", "u5", "u6"];
    let ctx = file_context(&dir, &users).await;

    let mut handles = Vec::new();
    for actor in users {
        for target in users {
            if actor == target {
                continue;
            }
            let engine = ctx.engine.clone();
            handles.push(tokio::spawn(async move {
                engine.record_like(actor, target, LikeKind::Like).await
            }));
        }
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Anything whose match step lost a race to a storage error is repaired here
    ctx.engine.reconcile_matches(1000).await.unwrap();

    let pairs = (users.len() * (users.len() - 1) / 2) as i64;
    assert_eq!(count(&ctx, "SELECT COUNT(*) FROM likes").await, pairs * 2);
    assert_eq!(count(&ctx, "SELECT COUNT(*) FROM matches").await, pairs);
    assert_eq!(count(&ctx, "SELECT COUNT(*) FROM conversations").await, pairs);
    assert_eq!(
        count(&ctx, "SELECT COUNT(*) FROM notifications WHERE kind = 'match'").await,
        pairs * 2
    );

    for user in users {
        let matches = ctx.engine.list_matches_for(user).await.unwrap();
        assert_eq!(matches.len(), users.len() - 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_super_likes_respect_quota() {
    let dir = tempfile::tempdir().unwrap();
    let users = ["alice", "t1", "t2", "t3", "t4", "t5", "t6"];
    let ctx = file_context(&dir, &users).await;

    let mut handles = Vec::new();
    for target in &users[1..] {
        let engine = ctx.engine.clone();
        let target = target.to_string();
        handles.push(tokio::spawn(async move {
            engine.record_like("alice", &target, LikeKind::SuperLike).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(matches!(e, tandem::EngineError::QuotaExceeded { .. })),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(
        count(&ctx, "SELECT COUNT(*) FROM likes WHERE kind = 'super_like'").await,
        1
    );
}

#[tokio::test]
async fn test_like_and_pass_race_leaves_one_decision() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = file_context(&dir, &["alice", "bob"]).await;

    let like = {
        let engine = ctx.engine.clone();
        tokio::spawn(async move { engine.record_like("alice", "bob", LikeKind::Like).await })
    };
    let pass = {
        let engine = ctx.engine.clone();
        tokio::spawn(async move { engine.record_pass("alice", "bob").await })
    };

    let like = like.await.unwrap();
    let pass = pass.await.unwrap();
    assert!(like.is_ok() != pass.is_ok());

    let decisions = count(&ctx, "SELECT COUNT(*) FROM likes").await
        + count(&ctx, "SELECT COUNT(*) FROM passes").await;
    assert_eq!(decisions, 1);
}

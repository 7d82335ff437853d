/// Background task implementations
use crate::{context::AppContext, error::EngineResult};
use chrono::Duration;

/// Pairs examined per reconciliation run
const RECONCILE_BATCH: i64 = 500;

/// Re-run the match check for mutual likes missing a match or conversation
pub async fn reconcile_matches(ctx: &AppContext) -> EngineResult<usize> {
    ctx.engine.reconcile_matches(RECONCILE_BATCH).await
}

/// Delete read notifications older than the retention window
pub async fn purge_notifications(ctx: &AppContext) -> EngineResult<u64> {
    let cutoff = crate::db::now() - Duration::days(ctx.config.notifications.retention_days);
    ctx.engine.dispatcher().purge_read_before(cutoff).await
}

/// Health check - verify all systems are operational
pub async fn health_check(ctx: &AppContext) -> EngineResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}

/// Notification endpoints
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::EngineResult,
    notifications::NotificationEvent,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsParams {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsResponse {
    pub notifications: Vec<NotificationEvent>,
    pub unread_count: i64,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/:id/read", post(mark_read))
}

async fn list_notifications(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<ListNotificationsParams>,
) -> EngineResult<Json<NotificationsResponse>> {
    let notifications = ctx
        .engine
        .list_notifications_for(auth.user_id(), params.unread_only, params.limit)
        .await?;
    let unread_count = ctx.engine.unread_notification_count(auth.user_id()).await?;

    Ok(Json(NotificationsResponse {
        notifications,
        unread_count,
    }))
}

async fn mark_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(notification_id): Path<String>,
) -> EngineResult<Json<serde_json::Value>> {
    ctx.engine
        .mark_notification_read(auth.user_id(), &notification_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn mark_all_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> EngineResult<Json<serde_json::Value>> {
    let updated = ctx.engine.mark_all_notifications_read(auth.user_id()).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// Current user endpoints
use crate::{
    api::validate_request,
    auth::AuthContext,
    context::AppContext,
    error::EngineResult,
    identity::User,
    interactions::SuperLikeQuota,
};
use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Profile update body
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
    #[validate(url)]
    pub photo_url: Option<String>,
}

/// Current user with unread notification count
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub unread_notifications: i64,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/profile", put(update_profile))
        .route("/api/me/quota", get(get_quota))
}

async fn get_me(State(ctx): State<AppContext>, auth: AuthContext) -> EngineResult<Json<MeResponse>> {
    let unread_notifications = ctx.engine.unread_notification_count(auth.user_id()).await?;

    Ok(Json(MeResponse {
        user: auth.user,
        unread_notifications,
    }))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<UpdateProfileRequest>,
) -> EngineResult<Json<User>> {
    validate_request(&req)?;

    let user = ctx
        .users
        .update_profile(auth.user_id(), req.display_name.trim(), req.photo_url.as_deref())
        .await?;

    tracing::debug!(user = %user.id, "Profile updated");
    Ok(Json(user))
}

async fn get_quota(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> EngineResult<Json<SuperLikeQuota>> {
    Ok(Json(ctx.engine.super_like_quota(auth.user_id()).await?))
}

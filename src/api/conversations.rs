/// Conversation and messaging endpoints
use crate::{
    api::validate_request,
    auth::AuthContext,
    context::AppContext,
    conversations::{ConversationSummary, Message},
    error::EngineResult,
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// Paging for message history
#[derive(Debug, Deserialize)]
pub struct MessagesParams {
    pub limit: Option<i64>,
    /// Only messages strictly older than this
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

/// Send message body
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/conversations", get(list_conversations))
        .route(
            "/api/conversations/:id/messages",
            get(list_messages).post(send_message),
        )
}

async fn list_conversations(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> EngineResult<Json<ConversationsResponse>> {
    let conversations = ctx.engine.list_conversations_for(auth.user_id()).await?;
    Ok(Json(ConversationsResponse { conversations }))
}

async fn list_messages(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(conversation_id): Path<String>,
    Query(params): Query<MessagesParams>,
) -> EngineResult<Json<MessagesResponse>> {
    let messages = ctx
        .engine
        .list_messages(&conversation_id, auth.user_id(), params.limit, params.before)
        .await?;
    Ok(Json(MessagesResponse { messages }))
}

async fn send_message(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(conversation_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> EngineResult<Json<Message>> {
    validate_request(&req)?;

    let message = ctx
        .engine
        .send_message(&conversation_id, auth.user_id(), &req.body)
        .await?;
    Ok(Json(message))
}

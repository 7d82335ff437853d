/// Realtime change feed over WebSocket
///
/// Pushes the caller's new notifications and new messages in their
/// conversations as JSON frames tagged with `$type`:
/// - `#notification`: a stored notification addressed to the caller
/// - `#message`: a message in one of the caller's conversations
/// - `#info`: control messages (connected, lagged, errors)
///
/// Browsers cannot set headers on a WebSocket handshake, so the access token
/// travels in the `token` query parameter. A client that falls behind the
/// broadcast buffer, or stalls a send past the timeout, is disconnected and
/// is expected to reload from the REST endpoints.
use crate::{
    auth::authenticate_token,
    context::AppContext,
    conversations::{Message as ChatMessage, MessageEvent},
    error::EngineResult,
    metrics,
    notifications::NotificationEvent,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::{interval, timeout, Duration, Instant},
};

const SEND_TIMEOUT_MS: u64 = 5000;
const PING_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
pub struct RealtimeParams {
    pub token: String,
}

/// Frame pushed to realtime clients
#[derive(Debug, Serialize)]
#[serde(tag = "$type")]
pub enum RealtimeFrame {
    #[serde(rename = "#notification")]
    Notification(NotificationEvent),
    #[serde(rename = "#message")]
    Message(ChatMessage),
    #[serde(rename = "#info")]
    Info(RealtimeInfo),
}

#[derive(Debug, Serialize)]
pub struct RealtimeInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RealtimeFrame {
    fn info(name: &str, message: Option<String>) -> Self {
        RealtimeFrame::Info(RealtimeInfo {
            name: name.to_string(),
            message,
        })
    }
}

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/realtime", get(subscribe))
}

/// Authenticate, then upgrade
async fn subscribe(
    ws: WebSocketUpgrade,
    Query(params): Query<RealtimeParams>,
    State(ctx): State<AppContext>,
) -> EngineResult<Response> {
    let user = authenticate_token(&ctx, &params.token).await?;

    // Subscribe before the upgrade completes so nothing emitted in between is missed
    let notifications = ctx.engine.dispatcher().subscribe();
    let messages = ctx.engine.conversations().subscribe();

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user.id, notifications, messages)))
}

async fn handle_socket(
    socket: WebSocket,
    user_id: String,
    mut notifications: broadcast::Receiver<NotificationEvent>,
    mut messages: broadcast::Receiver<MessageEvent>,
) {
    let (mut sender, mut receiver) = socket.split();

    metrics::REALTIME_CONNECTIONS_ACTIVE.inc();
    tracing::debug!(user = %user_id, "Realtime subscriber connected");

    let connected = RealtimeFrame::info("Connected", None);
    if send_frame(&mut sender, &connected).await.is_err() {
        metrics::REALTIME_CONNECTIONS_ACTIVE.dec();
        return;
    }

    let mut ping_interval = interval(Duration::from_secs(PING_INTERVAL_SECS));
    let mut last_activity = Instant::now();

    loop {
        let frame = tokio::select! {
            event = notifications.recv() => match event {
                Ok(event) if event.recipient_id == user_id => RealtimeFrame::Notification(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    close_lagged(&mut sender, &user_id, skipped).await;
                    break;
                }
                Err(RecvError::Closed) => break,
            },

            event = messages.recv() => match event {
                Ok(event) if event.participants.iter().any(|p| *p == user_id) => {
                    RealtimeFrame::Message(event.message)
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    close_lagged(&mut sender, &user_id, skipped).await;
                    break;
                }
                Err(RecvError::Closed) => break,
            },

            _ = ping_interval.tick() => {
                if last_activity.elapsed() > Duration::from_secs(PING_INTERVAL_SECS)
                    && sender.send(Message::Ping(vec![])).await.is_err()
                {
                    break;
                }
                continue;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(user = %user_id, "Realtime client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Err(e)) => {
                        tracing::warn!(user = %user_id, "WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
                continue;
            }
        };

        match send_frame(&mut sender, &frame).await {
            Ok(()) => last_activity = Instant::now(),
            Err(SendError::Timeout) => {
                tracing::warn!(user = %user_id, "Send timeout, closing slow realtime client");
                break;
            }
            Err(SendError::Disconnected) => break,
        }
    }

    metrics::REALTIME_CONNECTIONS_ACTIVE.dec();
}

async fn close_lagged(sender: &mut SplitSink<WebSocket, Message>, user_id: &str, skipped: u64) {
    tracing::warn!(user = %user_id, skipped, "Realtime client lagged behind, disconnecting");
    let frame = RealtimeFrame::info(
        "Lagged",
        Some(format!("{} events dropped, reload and reconnect", skipped)),
    );
    let _ = send_frame(sender, &frame).await;
    let _ = sender.send(Message::Close(None)).await;
}

#[derive(Debug)]
enum SendError {
    Timeout,
    Disconnected,
}

/// Send a frame with timeout
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &RealtimeFrame,
) -> Result<(), SendError> {
    let json = serde_json::to_string(frame).map_err(|_| SendError::Disconnected)?;

    match timeout(Duration::from_millis(SEND_TIMEOUT_MS), sender.send(Message::Text(json))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(SendError::Disconnected),
        Err(_) => Err(SendError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        identity::ActorSummary,
        notifications::{NotificationKind, NotificationPayload},
    };
    use chrono::Utc;

    #[test]
    fn test_frames_are_tagged() {
        let frame = RealtimeFrame::Notification(NotificationEvent {
            id: "n1".to_string(),
            recipient_id: "bob".to_string(),
            kind: NotificationKind::Match,
            payload: NotificationPayload {
                actor: ActorSummary {
                    id: "alice".to_string(),
                    display_name: "Alice".to_string(),
                    photo_url: None,
                },
                match_id: Some("m1".to_string()),
                conversation_id: Some("c1".to_string()),
            },
            created_at: Utc::now(),
            read: false,
        });

        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["$type"], "#notification");
        assert_eq!(value["kind"], "match");
        assert_eq!(value["payload"]["conversationId"], "c1");

        let info = serde_json::to_value(RealtimeFrame::info("Connected", None)).unwrap();
        assert_eq!(info["$type"], "#info");
        assert!(info.get("message").is_none());
    }
}

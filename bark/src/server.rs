use crate::metrics_defs::PUSH_RECEIVED;
use crate::websocket::WebSocketHub;
use axum::{
    Router,
    body::Bytes,
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use shared::counter;
use shared::pubsub::TopicChannels;
use shared::topics::Topic;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AppState {
    pub hub: Option<Arc<WebSocketHub>>,
    pub push: Option<Arc<TopicChannels>>,
}

/// Routes for the health check plus the websocket and push endpoints that
/// are enabled.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new().route("/health", get(health));
    if state.hub.is_some() {
        router = router.route("/ws", get(serve_ws));
    }
    if state.push.is_some() {
        router = router.route("/push/{topic}", post(push));
    }
    router.with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn serve_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(hub) = state.hub else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let registration = match hub.register().await {
        Ok(registration) => registration,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting websocket connection");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    let id = registration.id;
    let failed_hub = hub.clone();
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(socket_id = %id, error = %e, "websocket upgrade failed");
        tokio::spawn(async move { failed_hub.deregister(id).await });
    })
    .on_upgrade(move |socket| async move { hub.serve(socket, registration).await })
}

/// Feeds a pushed envelope into the topic's subscriptions. Anything posted
/// to a known topic is acknowledged, even if it turns out to be malformed,
/// so that the sender never redelivers it.
async fn push(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    body: Bytes,
) -> StatusCode {
    let Some(channels) = state.push else {
        return StatusCode::NOT_FOUND;
    };
    let topic = match topic.parse::<Topic>() {
        Ok(topic) => topic,
        Err(e) => {
            tracing::warn!(error = %e, "push to unknown topic");
            return StatusCode::NOT_FOUND;
        }
    };

    counter!(PUSH_RECEIVED).increment(1);
    channels.deliver(topic, body.to_vec()).await;
    StatusCode::OK
}

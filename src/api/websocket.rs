//! WebSocket feed delivery.
//!
//! `GET /ws?channels=all,me,high,lucky`. On connect each requested channel
//! replays its backlog, then streams live settlements. Delivery is
//! best-effort: a subscriber that lags past the broadcast capacity drops
//! events and should reconcile through the pull side.

use super::{
    errors::ApiError,
    handlers::{AppState, BetBody, Principal},
    middleware::RequestId,
};
use crate::feed::FeedChannel;
use crate::games::types::BetRecord;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default = "default_channels")]
    pub channels: String,
}

fn default_channels() -> String {
    "all".to_string()
}

#[derive(Debug, Serialize)]
struct FeedEvent {
    channel: String,
    bet: BetBody,
}

/// Resolve the comma-separated channel list. `me` requires a principal.
fn resolve_channels(spec: &str, principal: Option<u64>) -> Result<Vec<FeedChannel>, String> {
    let mut channels = Vec::new();
    for name in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let channel = if name == "me" {
            match principal {
                Some(user_id) => FeedChannel::User(user_id),
                None => return Err("channel 'me' requires the x-user-id header".to_string()),
            }
        } else {
            name.parse()?
        };
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }
    if channels.is_empty() {
        return Err("at least one channel is required".to_string());
    }
    Ok(channels)
}

/// GET /ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    principal: Option<Principal>,
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let channels = resolve_channels(&params.channels, principal.map(|p| p.0))
        .map_err(|msg| ApiError::bad_request(request_id.0, msg))?;

    Ok(ws.on_upgrade(move |socket| serve_feed(socket, state, channels)))
}

async fn serve_feed(socket: WebSocket, state: Arc<AppState>, channels: Vec<FeedChannel>) {
    tracing::debug!(?channels, "feed subscriber connected");
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    for channel in channels {
        let (backlog, feed_rx) = state.feed.subscribe(channel);
        tokio::spawn(forward_channel(channel.to_string(), backlog, feed_rx, tx.clone()));
    }
    drop(tx);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Drain the client side until it closes or errors.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
    writer.abort();
    tracing::debug!("feed subscriber disconnected");
}

/// Replay one channel's backlog, then stream live records into the
/// connection's writer. Ends when the connection goes away.
async fn forward_channel(
    channel: String,
    backlog: Vec<BetRecord>,
    mut feed_rx: broadcast::Receiver<BetRecord>,
    tx: mpsc::Sender<String>,
) {
    for record in &backlog {
        if send_event(&tx, &channel, record).await.is_err() {
            return;
        }
    }
    loop {
        match feed_rx.recv().await {
            Ok(record) => {
                if send_event(&tx, &channel, &record).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(channel, skipped, "feed subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn send_event(
    tx: &mpsc::Sender<String>,
    channel: &str,
    record: &BetRecord,
) -> Result<(), ()> {
    let event = FeedEvent {
        channel: channel.to_string(),
        bet: record.into(),
    };
    match serde_json::to_string(&event) {
        Ok(text) => tx.send(text).await.map_err(|_| ()),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize feed event");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_dedupes_channel_list() {
        let channels = resolve_channels("all, high ,all,lucky", None).unwrap();
        assert_eq!(
            channels,
            vec![FeedChannel::All, FeedChannel::High, FeedChannel::Lucky]
        );
    }

    #[test]
    fn me_resolves_against_principal() {
        let channels = resolve_channels("me", Some(42)).unwrap();
        assert_eq!(channels, vec![FeedChannel::User(42)]);

        let err = resolve_channels("me", None).unwrap_err();
        assert!(err.contains("x-user-id"));
    }

    #[test]
    fn rejects_unknown_and_empty_specs() {
        assert!(resolve_channels("nope", None).is_err());
        assert!(resolve_channels("", None).is_err());
        assert!(resolve_channels(" , ", None).is_err());
    }
}

//! WebSocket broadcast of demo events.
//!
//! Every connected client receives session lifecycle changes, executed
//! browser actions and AI replies as they happen.

use crate::agent::types::ExecutedAction;
use crate::demo::schema::SessionStatus;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Maximum number of events to buffer per client.
const CHANNEL_CAPACITY: usize = 100;

/// WebSocket event types pushed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsEvent {
    /// Browser is up on the demo website.
    DemoStarted { session_id: String, website: String },
    /// Narration for a processed command.
    AiResponse {
        session_id: String,
        message: String,
        actions: Vec<ExecutedAction>,
        timestamp: u64,
    },
    /// One executed action, sent as soon as it is recorded.
    BrowserAction {
        session_id: String,
        action: ExecutedAction,
    },
    DemoStatus {
        session_id: String,
        status: SessionStatus,
    },
    Error {
        session_id: Option<String>,
        message: String,
    },
}

/// Shared broadcast sender for WebSocket events.
#[derive(Clone)]
pub struct WsBroadcaster {
    tx: broadcast::Sender<WsEvent>,
}

impl WsBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: WsEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.tx.subscribe()
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler for `/api/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Client disconnected
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("WebSocket client lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Axum answers pings itself; only watch for close
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let broadcaster = WsBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.broadcast(WsEvent::DemoStatus {
            session_id: "s1".to_string(),
            status: SessionStatus::Paused,
        });

        let event = rx.recv().await.unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "DemoStatus");
        assert_eq!(json["data"]["session_id"], "s1");
        assert_eq!(json["data"]["status"], "paused");
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let broadcaster = WsBroadcaster::default();
        broadcaster.broadcast(WsEvent::Error {
            session_id: None,
            message: "nobody listening".to_string(),
        });
    }
}

//! WebSocket support for live job progress.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use multipost_core::trust::PendingPrompt;
use multipost_core::JobEvent;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket message sent to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Progress of a running job.
    Job { event: JobEvent },
    /// The trusted-domain set changed.
    TrustChanged { entries: usize },
    /// An origin asked to be trusted and waits for the operator.
    TrustPrompt { prompt: PendingPrompt },
    /// Server heartbeat (sent periodically to keep connection alive).
    Heartbeat { timestamp: i64 },
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            WsMessage::Job { .. } => "job",
            WsMessage::TrustChanged { .. } => "trust_changed",
            WsMessage::TrustPrompt { .. } => "trust_prompt",
            WsMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, msg: WsMessage) {
        // No listeners is fine.
        let _ = self.sender.send(msg);
    }

    /// Subscribe to receive messages.
    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    pub fn job_event(&self, event: JobEvent) {
        self.broadcast(WsMessage::Job { event });
    }

    pub fn trust_changed(&self, entries: usize) {
        self.broadcast(WsMessage::TrustChanged { entries });
    }

    pub fn trust_prompt(&self, prompt: PendingPrompt) {
        self.broadcast(WsMessage::TrustPrompt { prompt });
    }

    /// Forward operator trust prompts until their channel closes.
    pub fn forward_trust_prompts(
        &self,
        mut prompts: broadcast::Receiver<PendingPrompt>,
    ) -> tokio::task::JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            loop {
                match prompts.recv().await {
                    Ok(prompt) => broadcaster.trust_prompt(prompt),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Trust prompt forwarder lagged, skipped {} prompts", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Forward orchestrator events until its channel closes.
    pub fn forward_job_events(
        &self,
        mut events: broadcast::Receiver<JobEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => broadcaster.job_event(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Job event forwarder lagged, skipped {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(std::time::Duration::from_secs(30));
        heartbeat.tick().await;
        loop {
            let msg = tokio::select! {
                result = rx.recv() => match result {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged, skipped {} messages", n);
                        WS_LAG_EVENTS.inc();
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                },
                _ = heartbeat.tick() => WsMessage::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp(),
                },
            };

            WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize WsMessage: {}", e),
            }
        }
    });

    // Clients only listen; inbound frames are drained until close.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => debug!("Ignoring text message: {}", text),
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forward_job_events() {
        let broadcaster = WsBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        let (tx, events) = broadcast::channel(16);
        let forwarder = broadcaster.forward_job_events(events);

        tx.send(JobEvent::JobStarted {
            job_id: "j1".to_string(),
            targets: 2,
        })
        .unwrap();
        drop(tx);
        forwarder.await.unwrap();

        match rx.recv().await.unwrap() {
            WsMessage::Job { event } => assert_eq!(event.job_id(), "j1"),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_message_wire_format() {
        let msg = WsMessage::TrustChanged { entries: 3 };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "trust_changed");
        assert_eq!(json["entries"], 3);

        let msg = WsMessage::Job {
            event: JobEvent::JobFinished {
                job_id: "j1".to_string(),
                succeeded: 1,
                failed: 0,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "job");
        assert_eq!(json["event"]["type"], "job_finished");
    }

    #[tokio::test]
    async fn test_forward_trust_prompts() {
        let broadcaster = WsBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        let (tx, prompts) = broadcast::channel(16);
        let forwarder = broadcaster.forward_trust_prompts(prompts);

        let now = chrono::Utc::now();
        tx.send(PendingPrompt {
            id: "p1".to_string(),
            host: "studio.example.com".to_string(),
            requested_at: now,
            expires_at: now,
        })
        .unwrap();
        drop(tx);
        forwarder.await.unwrap();

        let json = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
        assert_eq!(json["type"], "trust_prompt");
        assert_eq!(json["prompt"]["id"], "p1");
        assert_eq!(json["prompt"]["host"], "studio.example.com");
    }

    #[test]
    fn test_broadcast_without_listeners() {
        let broadcaster = WsBroadcaster::default();
        broadcaster.trust_changed(1);
    }
}

//! WebSocket connection management and message routing.
//!
//! Each connected client gets an outbound event channel and a
//! touched-service set. Inbound messages are decoded, dispatched to the
//! matching registered service and the service's response events are
//! forwarded in generation order. Malformed messages or unknown service
//! types fail the single message with an `error` event; the connection
//! stays alive. Disconnect runs idempotent cleanup on every service the
//! client touched.

use crate::server::service::{
    now_secs, EventSink, ServiceEvent, ServiceKind, ServiceMessage, ServiceRegistry,
};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// Raw inbound frame shape. `type` and `message_type` are both accepted
/// as the dispatch key.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    service_type: Option<String>,
    #[serde(rename = "type")]
    r#type: Option<String>,
    message_type: Option<String>,
    #[serde(default)]
    data: Value,
    session_id: Option<String>,
}

struct ClientState {
    events: mpsc::Sender<ServiceEvent>,
    touched: HashSet<ServiceKind>,
}

/// Tracks live client connections and routes their messages to services.
pub struct ConnectionManager {
    registry: Arc<ServiceRegistry>,
    clients: RwLock<HashMap<String, ClientState>>,
}

impl ConnectionManager {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub async fn active_connections(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Register a new connection and hand back its event channel.
    pub async fn connect(&self, client_id: &str) -> mpsc::Receiver<ServiceEvent> {
        let (tx, rx) = mpsc::channel(64);
        let mut clients = self.clients.write().await;
        clients.insert(
            client_id.to_string(),
            ClientState {
                events: tx,
                touched: HashSet::new(),
            },
        );
        info!("Client connected: {}", client_id);
        rx
    }

    /// Tear down a connection: cleanup on every touched service, then
    /// drop the session. Safe to call twice.
    pub async fn disconnect(&self, client_id: &str) {
        let removed = self.clients.write().await.remove(client_id);
        if removed.is_some() {
            self.registry.cleanup_client(client_id).await;
        }
        info!("Client disconnected: {}", client_id);
    }

    async fn send_to(&self, client_id: &str, event: ServiceEvent) {
        let sender = {
            let clients = self.clients.read().await;
            clients.get(client_id).map(|c| c.events.clone())
        };
        if let Some(sender) = sender {
            if sender.send(event).await.is_err() {
                warn!("Dropping event for vanished client {}", client_id);
            }
        }
    }

    /// Decode and dispatch one inbound frame for `client_id`.
    pub async fn handle_message(&self, client_id: &str, raw: &str) {
        debug!("Handling message for client {}", client_id);

        let inbound: InboundMessage = match serde_json::from_str(raw) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Malformed message from {}: {}", client_id, e);
                self.send_to(client_id, ServiceEvent::error("unknown", client_id, &e.to_string()))
                    .await;
                return;
            }
        };

        let raw_kind = inbound.service_type.as_deref().unwrap_or("ai_chat");
        let Some(kind) = ServiceKind::parse(raw_kind) else {
            warn!("Unknown service type '{}' from {}", raw_kind, client_id);
            self.send_to(
                client_id,
                ServiceEvent::error(
                    raw_kind,
                    client_id,
                    &format!("unknown service type: {raw_kind}"),
                ),
            )
            .await;
            return;
        };

        let Some(service) = self.registry.get(kind).await else {
            self.send_to(
                client_id,
                ServiceEvent::error(
                    kind.as_str(),
                    client_id,
                    &format!("service {kind} not registered"),
                ),
            )
            .await;
            return;
        };

        let message = ServiceMessage {
            service_type: kind,
            message_type: inbound
                .r#type
                .or(inbound.message_type)
                .unwrap_or_default(),
            data: inbound.data,
            client_id: client_id.to_string(),
            session_id: inbound.session_id,
            timestamp: now_secs(),
        };

        let sink = {
            let mut clients = self.clients.write().await;
            let Some(state) = clients.get_mut(client_id) else {
                return;
            };
            state.touched.insert(kind);
            EventSink::new(state.events.clone())
        };

        if let Err(e) = service.handle_message(message, &sink).await {
            error!("Service {} failed for {}: {}", kind, client_id, e);
            self.send_to(
                client_id,
                ServiceEvent::error(kind.as_str(), client_id, &e.to_string()),
            )
            .await;
        }
    }
}

/// Drive one accepted WebSocket until the peer goes away.
///
/// The write half drains the client's event channel; the read half feeds
/// inbound frames through the manager one at a time, so response events
/// for a request are delivered in generation order.
pub async fn run_connection(socket: WebSocket, manager: Arc<ConnectionManager>, client_id: String) {
    let mut events = manager.connect(&client_id).await;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(raw)) => {
                manager.handle_message(&client_id, raw.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(_) => {
                manager
                    .send_to(
                        &client_id,
                        ServiceEvent::error(
                            "unknown",
                            &client_id,
                            "binary frames are not supported",
                        ),
                    )
                    .await;
            }
            Err(e) => {
                warn!("WebSocket transport error for {}: {}", client_id, e);
                break;
            }
        }
    }

    manager.disconnect(&client_id).await;
    writer.abort();
}

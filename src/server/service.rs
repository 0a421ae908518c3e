//! Pluggable realtime services and their registry.
//!
//! A service handles one class of interaction (chat, speech, audio
//! synthesis). Instances are long-lived singletons shared across clients,
//! so all per-client state is keyed by client id. For each inbound message
//! a service produces a finite, ordered sequence of response events
//! through an [`EventSink`]; the connection layer forwards them in
//! generation order.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, RwLock};

/// Closed set of service kinds addressable over a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    AiChat,
    Chat,
    Transcription,
    Tts,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::AiChat => "ai_chat",
            ServiceKind::Chat => "chat",
            ServiceKind::Transcription => "transcription",
            ServiceKind::Tts => "tts",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ai_chat" => Some(ServiceKind::AiChat),
            "chat" => Some(ServiceKind::Chat),
            "transcription" => Some(ServiceKind::Transcription),
            "tts" => Some(ServiceKind::Tts),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seconds since the epoch, as carried on every message and event.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// One decoded inbound message, consumed by exactly one service.
#[derive(Debug, Clone)]
pub struct ServiceMessage {
    pub service_type: ServiceKind,
    pub message_type: String,
    pub data: Value,
    pub client_id: String,
    pub session_id: Option<String>,
    pub timestamp: f64,
}

/// One outbound response event.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub service_type: String,
    pub data: Value,
    pub client_id: String,
    pub timestamp: f64,
}

impl ServiceEvent {
    pub fn new(event_type: &str, service_type: &str, client_id: &str, data: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            service_type: service_type.to_string(),
            data,
            client_id: client_id.to_string(),
            timestamp: now_secs(),
        }
    }

    pub fn error(service_type: &str, client_id: &str, message: &str) -> Self {
        Self::new(
            "error",
            service_type,
            client_id,
            serde_json::json!({ "error": message }),
        )
    }
}

/// Ordered event channel from a service back to one client's connection.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ServiceEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ServiceEvent>) -> Self {
        Self { tx }
    }

    /// Emit one event. Returns false when the client is gone; handlers
    /// should stop producing once that happens.
    pub async fn emit(&self, event: ServiceEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

/// A realtime service. One instance per kind for the process lifetime.
#[async_trait]
pub trait Service: Send + Sync {
    fn kind(&self) -> ServiceKind;

    /// Handle one inbound message, emitting the response events for this
    /// request into `sink` in order.
    async fn handle_message(&self, message: ServiceMessage, sink: &EventSink) -> Result<()>;

    /// Release any per-client state. Must be idempotent: safe to call for
    /// an unknown or already-cleaned client.
    async fn cleanup(&self, client_id: &str);
}

type ServiceCtor = Box<dyn Fn() -> Arc<dyn Service> + Send + Sync>;

/// Registry of services, keyed by kind. Instances are constructed lazily
/// on first use and live for the rest of the process; construction is
/// serialized behind the instance lock.
pub struct ServiceRegistry {
    constructors: HashMap<ServiceKind, ServiceCtor>,
    instances: RwLock<HashMap<ServiceKind, Arc<dyn Service>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn register<F>(&mut self, kind: ServiceKind, constructor: F)
    where
        F: Fn() -> Arc<dyn Service> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Box::new(constructor));
    }

    /// Get the singleton for `kind`, constructing it on first use.
    /// Returns None for kinds without a registered constructor.
    pub async fn get(&self, kind: ServiceKind) -> Option<Arc<dyn Service>> {
        {
            let instances = self.instances.read().await;
            if let Some(service) = instances.get(&kind) {
                return Some(service.clone());
            }
        }

        let mut instances = self.instances.write().await;
        if let Some(service) = instances.get(&kind) {
            return Some(service.clone());
        }
        let constructor = self.constructors.get(&kind)?;
        let service = constructor();
        instances.insert(kind, service.clone());
        Some(service)
    }

    /// Run cleanup for `client_id` on every constructed service.
    pub async fn cleanup_client(&self, client_id: &str) {
        let services: Vec<Arc<dyn Service>> =
            self.instances.read().await.values().cloned().collect();
        for service in services {
            service.cleanup(client_id).await;
        }
    }

    pub fn supported(&self) -> Vec<ServiceKind> {
        self.constructors.keys().copied().collect()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingService {
        cleanups: AtomicUsize,
    }

    #[async_trait]
    impl Service for CountingService {
        fn kind(&self) -> ServiceKind {
            ServiceKind::Chat
        }

        async fn handle_message(&self, message: ServiceMessage, sink: &EventSink) -> Result<()> {
            sink.emit(ServiceEvent::new(
                "echo",
                self.kind().as_str(),
                &message.client_id,
                message.data,
            ))
            .await;
            Ok(())
        }

        async fn cleanup(&self, _client_id: &str) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_service_kind_parse() {
        assert_eq!(ServiceKind::parse("ai_chat"), Some(ServiceKind::AiChat));
        assert_eq!(ServiceKind::parse("tts"), Some(ServiceKind::Tts));
        assert_eq!(ServiceKind::parse("bogus"), None);
    }

    #[tokio::test]
    async fn test_registry_lazy_singleton() {
        let mut registry = ServiceRegistry::new();
        registry.register(ServiceKind::Chat, || {
            Arc::new(CountingService {
                cleanups: AtomicUsize::new(0),
            })
        });

        let first = registry.get(ServiceKind::Chat).await.unwrap();
        let second = registry.get(ServiceKind::Chat).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.get(ServiceKind::Tts).await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_only_touches_constructed_services() {
        let mut registry = ServiceRegistry::new();
        registry.register(ServiceKind::Chat, || {
            Arc::new(CountingService {
                cleanups: AtomicUsize::new(0),
            })
        });

        // Nothing constructed yet: cleanup is a no-op.
        registry.cleanup_client("c1").await;

        let service = registry.get(ServiceKind::Chat).await.unwrap();
        registry.cleanup_client("c1").await;
        registry.cleanup_client("c1").await;

        // Idempotent: both calls went through without effect on others.
        let _ = service;
    }

    #[tokio::test]
    async fn test_event_sink_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = EventSink::new(tx);
        for i in 0..3 {
            sink.emit(ServiceEvent::new(
                &format!("e{i}"),
                "chat",
                "c",
                Value::Null,
            ))
            .await;
        }
        drop(sink);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.event_type);
        }
        assert_eq!(seen, vec!["e0", "e1", "e2"]);
    }
}

//! The chat/voice assistant service.
//!
//! Handles streamed chat requests, speech recognition of uploaded audio
//! and optional spoken replies, keeping per-client conversation state.
//! The service is a process-wide singleton; every piece of state is keyed
//! by client id.

use crate::error::{Result, VidscribeError};
use crate::server::service::{EventSink, Service, ServiceEvent, ServiceKind, ServiceMessage};
use crate::server::speech::SpeechTranscriber;
use crate::server::tts::{audio_event_payloads, SpeechSynthesizer};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

const CHAT_MODEL: &str = "gpt-4o";
const CHAT_TEMPERATURE: f64 = 0.5;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful instructor assistant. Answer in simple, clear language, \
     keep replies short, and when the user practices a phrase, say whether it is \
     correct and invite another example.";

/// One turn of a conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: &'static str,
    pub content: String,
}

/// Streaming chat-completion client.
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Stream a chat completion, sending each content delta into `deltas`
    /// as it arrives. Returns the full assistant message.
    pub async fn stream_chat(
        &self,
        turns: &[ChatTurn],
        deltas: mpsc::Sender<String>,
    ) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": CHAT_MODEL,
                "messages": turns,
                "temperature": CHAT_TEMPERATURE,
                "stream": true,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VidscribeError::Chat(format!(
                "chat engine error ({status}): {body}"
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut assistant_message = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Server-sent events are separated by blank lines.
            while let Some(pos) = buffer.find("\n\n") {
                let event: String = buffer.drain(..pos + 2).collect();
                for line in event.lines() {
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data.trim() == "[DONE]" {
                        return Ok(assistant_message);
                    }
                    let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) else {
                        debug!("Skipping unparsable stream chunk");
                        continue;
                    };
                    if let Some(content) = parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content)
                    {
                        assistant_message.push_str(&content);
                        if deltas.send(content).await.is_err() {
                            // Receiver gone; finish reading for the full text.
                            debug!("Chat delta receiver dropped");
                        }
                    }
                }
            }
        }

        Ok(assistant_message)
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// Per-client assistant state.
#[derive(Default)]
struct ClientSession {
    session_id: Option<String>,
    history: Vec<ChatTurn>,
    is_listening: bool,
    voice_replies: bool,
    in_flight: bool,
}

/// The assistant service: streaming chat, speech recognition and spoken
/// replies behind the `ai_chat` service kind.
pub struct AssistantService {
    chat: Arc<ChatClient>,
    speech: Arc<SpeechTranscriber>,
    tts: Arc<SpeechSynthesizer>,
    sessions: RwLock<HashMap<String, ClientSession>>,
}

impl AssistantService {
    pub fn new(
        chat: Arc<ChatClient>,
        speech: Arc<SpeechTranscriber>,
        tts: Arc<SpeechSynthesizer>,
    ) -> Self {
        Self {
            chat,
            speech,
            tts,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn kind_str(&self) -> &'static str {
        ServiceKind::AiChat.as_str()
    }

    async fn ensure_session(&self, client_id: &str, session_id: Option<&str>) {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(client_id.to_string()).or_default();
        if session.session_id.is_none() {
            session.session_id = session_id.map(str::to_string);
        }
    }

    async fn handle_connect(&self, message: &ServiceMessage, sink: &EventSink) {
        let voice_replies = message.data["voice_replies"].as_bool().unwrap_or(false);
        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(&message.client_id) {
                session.voice_replies = voice_replies;
            }
        }

        sink.emit(ServiceEvent::new(
            "connect_ack",
            self.kind_str(),
            &message.client_id,
            serde_json::json!({
                "supported_features": ["streaming", "speech_recognition", "tts"],
                "voice_replies": voice_replies,
            }),
        ))
        .await;
    }

    async fn handle_chat_request(&self, message: &ServiceMessage, sink: &EventSink) -> Result<()> {
        let client_id = &message.client_id;
        let Some(user_text) = message.data["message"].as_str() else {
            return Err(VidscribeError::Chat(
                "chat_request is missing 'message'".to_string(),
            ));
        };
        let system_prompt = message.data["prompt"]
            .as_str()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
            .to_string();

        let (turns, voice_replies) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.entry(client_id.clone()).or_default();
            session.in_flight = true;
            if session.history.is_empty() {
                session.history.push(ChatTurn {
                    role: "system",
                    content: system_prompt,
                });
            }
            session.history.push(ChatTurn {
                role: "user",
                content: user_text.to_string(),
            });
            (session.history.clone(), session.voice_replies)
        };

        let (delta_tx, mut delta_rx) = mpsc::channel::<String>(32);
        let chat = self.chat.clone();
        let request = tokio::spawn(async move { chat.stream_chat(&turns, delta_tx).await });

        while let Some(content) = delta_rx.recv().await {
            let delivered = sink
                .emit(ServiceEvent::new(
                    "chat_response_chunk",
                    self.kind_str(),
                    client_id,
                    serde_json::json!({ "content": content }),
                ))
                .await;
            if !delivered {
                break;
            }
        }

        let assistant_message = match request.await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                self.clear_in_flight(client_id).await;
                return Err(e);
            }
            Err(e) => {
                self.clear_in_flight(client_id).await;
                return Err(VidscribeError::Chat(format!("chat request task failed: {e}")));
            }
        };

        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(client_id) {
                session.history.push(ChatTurn {
                    role: "assistant",
                    content: assistant_message.clone(),
                });
                session.in_flight = false;
            }
        }

        if voice_replies && !assistant_message.trim().is_empty() {
            info!("Generating spoken reply for {}", client_id);
            match self.tts.synthesize(&assistant_message).await {
                Ok(audio) => {
                    for payload in audio_event_payloads(&audio) {
                        let delivered = sink
                            .emit(ServiceEvent::new(
                                "audio_chunk",
                                self.kind_str(),
                                client_id,
                                serde_json::to_value(&payload)?,
                            ))
                            .await;
                        if !delivered {
                            break;
                        }
                    }
                }
                Err(e) => {
                    // Spoken reply is best-effort; the text already went out.
                    error!("TTS generation failed for {}: {}", client_id, e);
                }
            }
        }

        Ok(())
    }

    async fn handle_speech_data(&self, message: &ServiceMessage, sink: &EventSink) -> Result<()> {
        let Some(encoded) = message.data["audio_data"].as_str() else {
            return Err(VidscribeError::Recognition(
                "speech_data is missing 'audio_data'".to_string(),
            ));
        };
        let audio = BASE64
            .decode(encoded)
            .map_err(|e| VidscribeError::Recognition(format!("invalid audio encoding: {e}")))?;
        let language = message.data["language"].as_str().unwrap_or("en");

        let recognition = self.speech.transcribe_bytes(&audio, language).await?;
        sink.emit(ServiceEvent::new(
            "speech_transcription",
            self.kind_str(),
            &message.client_id,
            serde_json::json!({
                "text": recognition.text,
                "is_final": true,
            }),
        ))
        .await;
        Ok(())
    }

    async fn set_listening(&self, client_id: &str, listening: bool) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(client_id) {
            session.is_listening = listening;
        }
    }

    async fn clear_in_flight(&self, client_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(client_id) {
            session.in_flight = false;
        }
    }

    async fn ack(&self, event_type: &str, client_id: &str, status: &str, sink: &EventSink) {
        sink.emit(ServiceEvent::new(
            event_type,
            self.kind_str(),
            client_id,
            serde_json::json!({ "status": status }),
        ))
        .await;
    }
}

#[async_trait]
impl Service for AssistantService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::AiChat
    }

    async fn handle_message(&self, message: ServiceMessage, sink: &EventSink) -> Result<()> {
        let client_id = message.client_id.clone();
        self.ensure_session(&client_id, message.session_id.as_deref())
            .await;

        match message.message_type.as_str() {
            "connect" => {
                self.handle_connect(&message, sink).await;
                Ok(())
            }
            "chat_request" => self.handle_chat_request(&message, sink).await,
            "speech_start" => {
                self.set_listening(&client_id, true).await;
                self.ack("speech_start_ack", &client_id, "listening", sink).await;
                Ok(())
            }
            "speech_data" => self.handle_speech_data(&message, sink).await,
            "speech_end" => {
                self.set_listening(&client_id, false).await;
                self.ack("speech_end_ack", &client_id, "stopped", sink).await;
                Ok(())
            }
            "interrupt" => {
                // Advisory: discards the in-flight handle without touching
                // the already-issued engine call.
                self.clear_in_flight(&client_id).await;
                self.ack("interrupt_ack", &client_id, "interrupted", sink).await;
                Ok(())
            }
            other => {
                warn!("Unknown assistant message type: {}", other);
                sink.emit(ServiceEvent::error(
                    self.kind_str(),
                    &client_id,
                    &format!("Unknown message type: {other}"),
                ))
                .await;
                Ok(())
            }
        }
    }

    async fn cleanup(&self, client_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(client_id) {
            session.is_listening = false;
            session.in_flight = false;
        }
        sessions.remove(client_id);
    }
}

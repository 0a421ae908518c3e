//! Network boundary: HTTP endpoints and the WebSocket entry point.
//!
//! This layer stays thin; engine and pipeline errors are converted into
//! structured bodies here rather than surfacing as transport failures.

pub mod assistant;
pub mod service;
pub mod speech;
pub mod tts;
pub mod ws;

use crate::audio::FfmpegChunker;
use crate::config::{Config, TenantResolver};
use crate::error::{Result, VidscribeError};
use crate::lang::{language_label, SUPPORTED_LANGUAGES};
use crate::pipeline::{error_payload, ProcessRequest, VideoPipeline};
use crate::server::assistant::{AssistantService, ChatClient};
use crate::server::service::{ServiceKind, ServiceRegistry};
use crate::server::speech::SpeechTranscriber;
use crate::server::tts::SpeechSynthesizer;
use crate::server::ws::{run_connection, ConnectionManager};
use crate::sign::TokenIssuer;
use crate::storage::{ArtifactLayout, FsObjectStore};
use crate::transcribe::WhisperClient;
use crate::translate::ChatTranslator;
use crate::urls::build_streaming_urls;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<VideoPipeline>,
    pub manager: Arc<ConnectionManager>,
    pub signer: Arc<TokenIssuer>,
    pub tenants: Arc<TenantResolver>,
    pub storage_root: PathBuf,
}

/// Wire the full application from configuration.
pub fn build_state(config: &Config, tenants: Arc<TenantResolver>) -> Result<AppState> {
    let api_key = config
        .openai_api_key
        .clone()
        .ok_or_else(|| VidscribeError::Config("OPENAI_API_KEY not set".to_string()))?;
    let base_url = config.engine_base_url.clone();

    let recognizer = Arc::new(WhisperClient::with_base_url(api_key.clone(), base_url.clone()));
    let translator = Arc::new(ChatTranslator::with_base_url(api_key.clone(), base_url.clone()));
    let signer = Arc::new(TokenIssuer::new(Duration::from_secs(config.token_max_age_secs)));
    let store = Arc::new(FsObjectStore::new(config.bucket_root.clone()));

    let pipeline = Arc::new(VideoPipeline::new(
        store,
        Arc::new(FfmpegChunker),
        recognizer.clone(),
        translator,
        tenants.clone(),
        signer.clone(),
        config.storage_dir.clone(),
    ));

    let chat = Arc::new(ChatClient::new(api_key.clone(), base_url.clone()));
    let speech = Arc::new(SpeechTranscriber::new(recognizer));
    let synthesizer = Arc::new(SpeechSynthesizer::new(api_key, base_url));

    let mut registry = ServiceRegistry::new();
    registry.register(ServiceKind::AiChat, move || {
        Arc::new(AssistantService::new(
            chat.clone(),
            speech.clone(),
            synthesizer.clone(),
        ))
    });

    Ok(AppState {
        pipeline,
        manager: Arc::new(ConnectionManager::new(Arc::new(registry))),
        signer,
        tenants,
        storage_root: config.storage_dir.clone(),
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/ping", get(ping))
        .route("/api/health", get(health))
        .route("/api/services", get(services))
        .route("/api/transcribe", post(transcribe))
        .route("/api/subtitles", get(subtitles))
        .route("/api/storage-secure/{token}", get(storage_secure))
        .route("/ws/{client_id}", get(ws_upgrade))
        .with_state(state)
}

pub async fn run_server(router: Router, bind_addr: &str) -> Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("Server listening on {}", bind_addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "active_connections": state.manager.active_connections().await,
        "supported_services": state.manager.registry().supported().len(),
    }))
}

async fn services(State(state): State<AppState>) -> Json<serde_json::Value> {
    let services: Vec<_> = state
        .manager
        .registry()
        .supported()
        .into_iter()
        .map(|kind| {
            json!({
                "type": kind.as_str(),
                "description": format!("{kind} service"),
            })
        })
        .collect();
    Json(json!({ "services": services }))
}

async fn transcribe(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Json<serde_json::Value> {
    info!(
        "Starting transcription for {}/{} | lang={}, translate={}, languages={:?}, override={}",
        request.bucket,
        request.target,
        request.prompt_lang,
        request.enable_translation,
        request.languages,
        request.override_existing
    );

    match state.pipeline.process_target(&request).await {
        Ok(results) => Json(serde_json::to_value(results).unwrap_or_default()),
        Err(e) => {
            warn!("Transcription of {} failed: {}", request.target, e);
            Json(error_payload(&e))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubtitlesQuery {
    video_key: String,
    #[serde(default)]
    advanced: bool,
    #[serde(default = "default_client")]
    client_id: String,
}

fn default_client() -> String {
    "default".to_string()
}

async fn subtitles(
    State(state): State<AppState>,
    Query(query): Query<SubtitlesQuery>,
) -> Json<serde_json::Value> {
    info!(
        "Getting subtitle tracks for {} (advanced: {}, client_id: {})",
        query.video_key, query.advanced, query.client_id
    );

    let tenant = state.tenants.resolve(&query.client_id);
    let layout = ArtifactLayout::for_key(&state.storage_root, &query.video_key);

    let mut tracks = Vec::new();
    for code in SUPPORTED_LANGUAGES {
        // The source-language track carries no language suffix.
        let lang = if code == "en" { None } else { Some(code) };
        if layout.subtitle_path(lang).exists() {
            tracks.push(json!({
                "file": state.signer.sign(&layout.subtitle_relative(lang)),
                "label": language_label(code),
                "lang": code,
            }));
        }
    }

    let urls = build_streaming_urls(&tenant.cloudfront_base_url, &query.video_key, query.advanced);
    Json(json!({
        "tracks": tracks,
        "dash_url": urls.dash_url,
        "hls_url": urls.hls_url,
        "preview_url": urls.preview_url,
    }))
}

async fn storage_secure(
    State(state): State<AppState>,
    AxumPath(token): AxumPath<String>,
) -> Response {
    let path = match state.signer.redeem(&token) {
        Ok(path) => path,
        Err(_) => {
            return (StatusCode::FORBIDDEN, Json(json!({ "error": "Invalid token" })))
                .into_response();
        }
    };

    let full_path = state.storage_root.join(&path);
    match tokio::fs::read_to_string(&full_path).await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/vtt; charset=utf-8")],
            content,
        )
            .into_response(),
        Err(_) => {
            warn!("Signed path not found on disk: {}", full_path.display());
            (StatusCode::NOT_FOUND, Json(json!({ "error": "File not found" }))).into_response()
        }
    }
}

async fn ws_upgrade(
    State(state): State<AppState>,
    AxumPath(client_id): AxumPath<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_connection(socket, state.manager.clone(), client_id))
}

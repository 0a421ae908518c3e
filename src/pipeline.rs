//! The video processing orchestrator.
//!
//! Drives chunking, recognition, subtitle assembly, persistence and
//! secondary translations per video, skipping work whose artifacts already
//! exist. Engine and storage access go through injected trait objects so
//! the whole flow is testable without the real services.

use crate::audio::{remove_chunk, Chunker, CHUNK_DURATION_SECS};
use crate::config::TenantResolver;
use crate::error::{Result, VidscribeError};
use crate::lang::SUPPORTED_LANGUAGES;
use crate::sign::TokenIssuer;
use crate::storage::{ArtifactLayout, ObjectStore};
use crate::subtitle::{
    assemble_track, compose_blocks, compose_document, normalize_timestamps, parse_document,
    VTT_HEADER,
};
use crate::transcribe::{select_mode, Recognizer};
use crate::translate::Translator;
use crate::urls::build_streaming_urls;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extensions recognized as single-video targets.
pub const VIDEO_EXTENSIONS: [&str; 5] = [".mp4", ".mov", ".mkv", ".avi", ".qt"];

/// True if the key names a video file rather than a prefix.
pub fn is_video_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// One transcription request, as received at the network boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub bucket: String,
    /// A video key or a prefix expanded by listing.
    pub target: String,
    #[serde(default = "default_lang")]
    pub prompt_lang: String,
    #[serde(default)]
    pub enable_translation: bool,
    #[serde(default)]
    pub upload: bool,
    #[serde(default)]
    pub upload_bucket: Option<String>,
    #[serde(default)]
    pub upload_prefix: Option<String>,
    #[serde(default)]
    pub advanced_encoding: bool,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(rename = "override", default)]
    pub override_existing: bool,
    #[serde(default = "default_client")]
    pub client_id: String,
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_client() -> String {
    "default".to_string()
}

/// Which artifacts already exist for a video.
#[derive(Debug, Clone, Default)]
pub struct ExistingArtifacts {
    pub transcription: bool,
    pub translations: BTreeMap<String, bool>,
}

/// Per-video result record handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct VideoResult {
    pub transcript_url: String,
    pub subtitle_url: String,
    pub source_video: String,
    pub dash_url: String,
    pub hls_url: String,
    pub preview_url: String,
    pub available_languages: Vec<String>,
    /// `subtitle_url_{lang}` entries for every non-English translated track.
    #[serde(flatten)]
    pub translated_subtitle_urls: BTreeMap<String, String>,
}

/// The transcription/translation pipeline for stored videos.
pub struct VideoPipeline {
    store: Arc<dyn ObjectStore>,
    chunker: Arc<dyn Chunker>,
    recognizer: Arc<dyn Recognizer>,
    translator: Arc<dyn Translator>,
    tenants: Arc<TenantResolver>,
    signer: Arc<TokenIssuer>,
    storage_root: PathBuf,
    chunk_duration_secs: u64,
}

impl VideoPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        chunker: Arc<dyn Chunker>,
        recognizer: Arc<dyn Recognizer>,
        translator: Arc<dyn Translator>,
        tenants: Arc<TenantResolver>,
        signer: Arc<TokenIssuer>,
        storage_root: PathBuf,
    ) -> Self {
        Self {
            store,
            chunker,
            recognizer,
            translator,
            tenants,
            signer,
            storage_root,
            chunk_duration_secs: CHUNK_DURATION_SECS,
        }
    }

    /// Override the chunk duration (tests use short chunks).
    pub fn with_chunk_duration(mut self, secs: u64) -> Self {
        self.chunk_duration_secs = secs;
        self
    }

    /// Process a single video or every video under a prefix.
    ///
    /// Inside a prefix batch each video is isolated: a failing video is
    /// logged and skipped, the batch continues. A single-target failure
    /// propagates to the boundary handler.
    pub async fn process_target(&self, request: &ProcessRequest) -> Result<Vec<VideoResult>> {
        info!("Processing target: {}/{}", request.bucket, request.target);

        if is_video_key(&request.target) {
            info!("Detected single video file input");
            let result = self.process_single_video(request, &request.target).await?;
            return Ok(vec![result]);
        }

        info!("Detected directory input");
        let keys: Vec<String> = self
            .store
            .list_keys(&request.bucket, &request.target)
            .await?
            .into_iter()
            .filter(|k| is_video_key(k))
            .collect();
        info!("Found {} video files under {}", keys.len(), request.target);

        let mut results = Vec::new();
        for key in keys {
            match self.process_single_video(request, &key).await {
                Ok(result) => results.push(result),
                Err(e) => warn!("Processing of {} failed, continuing batch: {}", key, e),
            }
        }
        Ok(results)
    }

    /// Probe persisted output paths to decide what can be skipped.
    /// Existence only; content is never validated.
    pub fn check_existing(&self, key: &str, languages: &[String]) -> ExistingArtifacts {
        let layout = ArtifactLayout::for_key(&self.storage_root, key);
        ExistingArtifacts {
            transcription: layout.subtitle_path(None).exists(),
            translations: languages
                .iter()
                .map(|lang| (lang.clone(), layout.subtitle_path(Some(lang)).exists()))
                .collect(),
        }
    }

    /// Every language with a persisted subtitle track for this video: the
    /// source track plus each translated track found on disk.
    fn available_languages(&self, layout: &ArtifactLayout, prompt_lang: &str) -> Vec<String> {
        let mut languages = Vec::new();
        if layout.subtitle_path(None).exists() {
            languages.push(prompt_lang.to_string());
        }
        for lang in SUPPORTED_LANGUAGES {
            if layout.subtitle_path(Some(lang)).exists() && !languages.iter().any(|l| l == lang) {
                languages.push(lang.to_string());
            }
        }
        languages
    }

    pub async fn process_single_video(
        &self,
        request: &ProcessRequest,
        key: &str,
    ) -> Result<VideoResult> {
        info!("Processing single video: {}", key);
        debug!(
            "prompt_lang={}, enable_translation={}, languages={:?}, override={}, client_id={}",
            request.prompt_lang,
            request.enable_translation,
            request.languages,
            request.override_existing,
            request.client_id
        );

        let tenant = self.tenants.resolve(&request.client_id);
        let layout = ArtifactLayout::for_key(&self.storage_root, key);
        let existing = self.check_existing(key, &request.languages);
        let resume = existing.transcription && !request.override_existing;

        // The work dir (downloaded video + chunk files) lives only while
        // this video is processed; it is skipped entirely on resume.
        let mut _work_dir = None;

        let document = if resume {
            info!("Found existing transcription for {}, skipping transcription", key);
            std::fs::read_to_string(layout.subtitle_path(None))?
        } else {
            let work_dir = tempfile::tempdir()?;
            let video_path = work_dir.path().join("source.mp4");
            info!("Downloading {} from storage...", key);
            self.store
                .download(&request.bucket, key, &video_path)
                .await?;

            let chunks = self
                .chunker
                .chunk(&video_path, &work_dir.path().join("chunks"))?;
            let mode = select_mode(&request.prompt_lang, request.enable_translation);

            let mut full_transcript = String::new();
            let mut segment_groups = Vec::new();
            for chunk in &chunks {
                info!("Transcribing chunk: {}", chunk.path.display());
                let recognition = self
                    .recognizer
                    .recognize(chunk, &request.prompt_lang, mode.target_lang())
                    .await?;
                full_transcript.push_str(recognition.text.trim());
                full_transcript.push('\n');
                // Empty groups still advance the time offset at assembly.
                segment_groups.push(recognition.segments);
                remove_chunk(chunk)?;
            }

            let entries = assemble_track(&segment_groups, self.chunk_duration_secs);
            let document = compose_document(&entries);

            if request.upload {
                let bucket = request.upload_bucket.as_deref().unwrap_or(&request.bucket);
                self.store
                    .put(bucket, &layout.relative(".txt"), full_transcript.as_bytes())
                    .await?;
                self.store
                    .put(bucket, &layout.relative(".vtt"), document.as_bytes())
                    .await?;
            } else {
                layout.write(".txt", &full_transcript)?;
                layout.write(".vtt", &document)?;
            }

            _work_dir = Some(work_dir);
            document
        };

        self.run_translations(request, &layout, &existing, &document)
            .await?;

        let urls = build_streaming_urls(
            &tenant.cloudfront_base_url,
            key,
            request.advanced_encoding,
        );

        let available_languages = self.available_languages(&layout, &request.prompt_lang);
        info!("Available languages: {:?}", available_languages);

        let mut translated_subtitle_urls = BTreeMap::new();
        for lang in &available_languages {
            if lang == "en" {
                continue;
            }
            if layout.subtitle_path(Some(lang)).exists() {
                translated_subtitle_urls.insert(
                    format!("subtitle_url_{lang}"),
                    self.signer.sign(&layout.subtitle_relative(Some(lang))),
                );
            }
        }

        Ok(VideoResult {
            transcript_url: format!("/api/storage/{}", layout.relative(".txt")),
            subtitle_url: self.signer.sign(&layout.subtitle_relative(None)),
            source_video: key.to_string(),
            dash_url: urls.dash_url,
            hls_url: urls.hls_url,
            preview_url: urls.preview_url,
            available_languages,
            translated_subtitle_urls,
        })
    }

    /// Translate the assembled track into each requested language,
    /// honoring the skip rules. A failed language is logged and omitted;
    /// it never fails the video.
    async fn run_translations(
        &self,
        request: &ProcessRequest,
        layout: &ArtifactLayout,
        existing: &ExistingArtifacts,
        document: &str,
    ) -> Result<()> {
        if request.languages.is_empty() {
            return Ok(());
        }

        info!("Starting translation for languages: {:?}", request.languages);
        let entries = parse_document(document);
        if entries.is_empty() {
            warn!("No subtitle entries available for translation");
            return Ok(());
        }
        let source_text = compose_blocks(&entries);

        let mut requested = Vec::new();
        for lang in &request.languages {
            if !crate::lang::is_supported(lang) {
                warn!("Ignoring unsupported translation language: {}", lang);
                continue;
            }
            if lang == &request.prompt_lang {
                info!("Skipping translation to {} - same as source language", lang);
                continue;
            }
            if lang == "en" && request.prompt_lang == "en" {
                info!("Skipping translation to English - already source language");
                continue;
            }
            if requested.contains(lang) {
                continue;
            }
            requested.push(lang.clone());
        }

        for lang in &requested {
            if existing.translations.get(lang).copied().unwrap_or(false)
                && !request.override_existing
            {
                info!("Found existing translation for {}, skipping", lang);
                continue;
            }

            info!("Translating to {}", lang);
            match self.translator.translate(&source_text, lang).await {
                Ok(translated) => {
                    let translated_doc =
                        format!("{}{}", VTT_HEADER, normalize_timestamps(&translated));
                    if request.upload {
                        let bucket =
                            request.upload_bucket.as_deref().unwrap_or(&request.bucket);
                        let prefix = request.upload_prefix.as_deref().unwrap_or("vtt");
                        let upload_key =
                            format!("{}/{}_{}.vtt", prefix, layout.filename_base(), lang);
                        self.store
                            .put(bucket, &upload_key, translated_doc.as_bytes())
                            .await?;
                    } else {
                        layout.write(&format!("_{lang}.vtt"), &translated_doc)?;
                    }
                }
                Err(e) => {
                    warn!("Translation to {} failed: {}. Skipping language.", lang, e);
                }
            }
        }

        Ok(())
    }
}

/// Convert an error into the structured payload shape used at the
/// network boundary.
pub fn error_payload(e: &VidscribeError) -> serde_json::Value {
    serde_json::json!({ "error": e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_key() {
        assert!(is_video_key("dir/video.mp4"));
        assert!(is_video_key("dir/VIDEO.MOV"));
        assert!(is_video_key("clip.qt"));
        assert!(!is_video_key("dir/subfolder"));
        assert!(!is_video_key("notes.txt"));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: ProcessRequest =
            serde_json::from_str(r#"{"bucket": "media", "target": "course/intro.mp4"}"#).unwrap();
        assert_eq!(request.prompt_lang, "en");
        assert!(!request.enable_translation);
        assert!(!request.override_existing);
        assert_eq!(request.client_id, "default");
        assert!(request.languages.is_empty());
    }

    #[test]
    fn test_request_override_field_name() {
        let request: ProcessRequest = serde_json::from_str(
            r#"{"bucket": "b", "target": "t.mp4", "override": true, "languages": ["de"]}"#,
        )
        .unwrap();
        assert!(request.override_existing);
        assert_eq!(request.languages, vec!["de"]);
    }

    #[test]
    fn test_result_serializes_flat_language_urls() {
        let mut translated = BTreeMap::new();
        translated.insert("subtitle_url_de".to_string(), "/api/x".to_string());
        let result = VideoResult {
            transcript_url: "/api/storage/a/a.txt".to_string(),
            subtitle_url: "/api/storage-secure/t".to_string(),
            source_video: "a.mp4".to_string(),
            dash_url: "https://cdn/a/dash/stream.mpd".to_string(),
            hls_url: "https://cdn/a/hls/master.m3u8".to_string(),
            preview_url: "https://cdn/a/img/a_01.png".to_string(),
            available_languages: vec!["en".to_string(), "de".to_string()],
            translated_subtitle_urls: translated,
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["subtitle_url_de"], "/api/x");
        assert_eq!(value["available_languages"][1], "de");
    }
}

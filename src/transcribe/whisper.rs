use crate::audio::AudioChunk;
use crate::error::{Result, VidscribeError};
use crate::transcribe::{Recognition, Recognizer, TranscriptSegment};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Whisper model used for both endpoints.
const WHISPER_MODEL: &str = "whisper-1";

/// Speech engine client over the Whisper HTTP API.
///
/// Transcription pins the source language; translation renders the audio
/// into English. Both return `verbose_json` with time-stamped segments.
pub struct WhisperClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WhisperClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com".to_string())
    }

    /// Point the client at a different engine host.
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn build_form(&self, audio_path: &Path) -> Result<Form> {
        let file_bytes = fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.m4a")
            .to_string();

        let mime_type = match audio_path.extension().and_then(|e| e.to_str()) {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("ogg") => "audio/ogg",
            Some("webm") => "audio/webm",
            _ => "application/octet-stream",
        };

        let file_part = Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str(mime_type)?;

        Ok(Form::new()
            .part("file", file_part)
            .text("model", WHISPER_MODEL)
            .text("response_format", "verbose_json"))
    }

    async fn call_api(&self, endpoint: &str, form: Form) -> Result<WhisperResponse> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        debug!("Whisper API response status: {}", status);

        if status.is_success() {
            let body = response.text().await?;
            let parsed: WhisperResponse = serde_json::from_str(&body)?;
            return Ok(parsed);
        }

        let error_body = response.text().await.unwrap_or_default();
        if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
            return Err(VidscribeError::Recognition(format!(
                "Whisper API error: {} ({})",
                api_error.error.message, api_error.error.r#type
            )));
        }

        Err(VidscribeError::Recognition(format!(
            "Whisper API error ({status}): {error_body}"
        )))
    }

    fn parse_response(response: WhisperResponse) -> Recognition {
        let segments = response
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|seg| TranscriptSegment {
                start: seg.start,
                end: seg.end,
                text: seg.text.trim().to_string(),
            })
            .collect();

        Recognition {
            text: response.text,
            segments,
        }
    }
}

#[async_trait]
impl Recognizer for WhisperClient {
    async fn recognize(
        &self,
        chunk: &AudioChunk,
        source_lang: &str,
        target_lang: Option<&str>,
    ) -> Result<Recognition> {
        let form = self.build_form(&chunk.path).await?;

        let response = match target_lang {
            Some(target) if target != source_lang => {
                info!("Using Whisper translation: {} -> {}", source_lang, target);
                self.call_api("/v1/audio/translations", form).await?
            }
            _ => {
                info!("Using Whisper transcription in {}", source_lang);
                let form = form.text("language", source_lang.to_string());
                self.call_api("/v1/audio/transcriptions", form).await?
            }
        };

        let recognition = Self::parse_response(response);
        debug!(
            "Chunk {} recognized: {} chars, {} segments",
            chunk.index,
            recognition.text.len(),
            recognition.segments.len()
        );
        Ok(recognition)
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    r#type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_response_with_segments() {
        let response = WhisperResponse {
            text: "Hello world. How are you?".to_string(),
            segments: Some(vec![
                WhisperSegment {
                    start: 0.0,
                    end: 2.0,
                    text: " Hello world. ".to_string(),
                },
                WhisperSegment {
                    start: 2.5,
                    end: 4.0,
                    text: "How are you?".to_string(),
                },
            ]),
        };

        let recognition = WhisperClient::parse_response(response);
        assert_eq!(recognition.segments.len(), 2);
        assert_eq!(recognition.segments[0].text, "Hello world.");
        assert_eq!(recognition.segments[1].start, 2.5);
    }

    #[test]
    fn test_parse_response_without_segments() {
        let response = WhisperResponse {
            text: "Hello world".to_string(),
            segments: None,
        };

        let recognition = WhisperClient::parse_response(response);
        assert!(recognition.segments.is_empty());
        assert_eq!(recognition.text, "Hello world");
    }

    #[tokio::test]
    async fn test_recognize_missing_file() {
        let client = WhisperClient::new("test-key".to_string());
        let chunk = AudioChunk {
            index: 0,
            path: PathBuf::from("/tmp/nonexistent_chunk.m4a"),
        };
        assert!(client.recognize(&chunk, "en", None).await.is_err());
    }
}

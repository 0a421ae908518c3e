//! Text-to-speech synthesis, delivered as ordered base64 audio chunks.

use crate::error::{Result, VidscribeError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

const TTS_MODEL: &str = "tts-1";
const TTS_VOICE: &str = "alloy";

/// Payload size per `audio_chunk` event.
const AUDIO_CHUNK_BYTES: usize = 1024;

/// Client for the speech-synthesis endpoint.
pub struct SpeechSynthesizer {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SpeechSynthesizer {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Generate the complete audio for `text`.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        info!("Generating audio for {} chars of text", text.len());

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&SpeechRequest {
                model: TTS_MODEL,
                voice: TTS_VOICE,
                input: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VidscribeError::Synthesis(format!(
                "speech synthesis error ({status}): {body}"
            )));
        }

        let audio = response.bytes().await?.to_vec();
        debug!("Synthesized {} bytes of audio", audio.len());
        Ok(audio)
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

/// One chunk of synthesized audio as carried in an `audio_chunk` event.
#[derive(Debug, Clone, Serialize)]
pub struct AudioChunkPayload {
    pub audio_chunk: String,
    pub is_final: bool,
    pub progress: f64,
}

/// Split audio into ordered base64 event payloads.
pub fn audio_event_payloads(audio: &[u8]) -> Vec<AudioChunkPayload> {
    if audio.is_empty() {
        return Vec::new();
    }

    let total = audio.len();
    audio
        .chunks(AUDIO_CHUNK_BYTES)
        .enumerate()
        .map(|(i, chunk)| {
            let consumed = (i * AUDIO_CHUNK_BYTES + chunk.len()).min(total);
            AudioChunkPayload {
                audio_chunk: BASE64.encode(chunk),
                is_final: consumed >= total,
                progress: consumed as f64 / total as f64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_event_payloads_cover_input() {
        let audio = vec![7u8; 2500];
        let payloads = audio_event_payloads(&audio);

        assert_eq!(payloads.len(), 3);
        assert!(!payloads[0].is_final);
        assert!(!payloads[1].is_final);
        assert!(payloads[2].is_final);
        assert!((payloads[2].progress - 1.0).abs() < f64::EPSILON);

        let decoded: Vec<u8> = payloads
            .iter()
            .flat_map(|p| BASE64.decode(&p.audio_chunk).unwrap())
            .collect();
        assert_eq!(decoded, audio);
    }

    #[test]
    fn test_audio_event_payloads_empty() {
        assert!(audio_event_payloads(&[]).is_empty());
    }

    #[test]
    fn test_single_chunk_is_final() {
        let payloads = audio_event_payloads(&[1, 2, 3]);
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].is_final);
    }
}

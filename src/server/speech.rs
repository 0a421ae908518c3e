//! One-shot speech recognition for audio arriving over a connection.

use crate::audio::AudioChunk;
use crate::error::Result;
use crate::transcribe::{Recognition, Recognizer};
use std::sync::Arc;
use tracing::debug;

/// Transcribes in-memory audio by staging it through a temp file and the
/// shared speech engine.
pub struct SpeechTranscriber {
    recognizer: Arc<dyn Recognizer>,
}

impl SpeechTranscriber {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self { recognizer }
    }

    pub async fn transcribe_bytes(&self, audio: &[u8], language: &str) -> Result<Recognition> {
        let tmp = tempfile::Builder::new().suffix(".wav").tempfile()?;
        tokio::fs::write(tmp.path(), audio).await?;
        debug!(
            "Transcribing {} bytes of connection audio via {}",
            audio.len(),
            tmp.path().display()
        );

        let chunk = AudioChunk {
            index: 0,
            path: tmp.path().to_path_buf(),
        };
        // Temp file is removed when `tmp` drops, after the engine call.
        self.recognizer.recognize(&chunk, language, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::TranscriptSegment;
    use async_trait::async_trait;

    struct FixedRecognizer;

    #[async_trait]
    impl Recognizer for FixedRecognizer {
        async fn recognize(
            &self,
            chunk: &AudioChunk,
            _source_lang: &str,
            _target_lang: Option<&str>,
        ) -> Result<Recognition> {
            assert!(chunk.path.exists(), "audio must be staged before the call");
            Ok(Recognition {
                text: "heard you".to_string(),
                segments: vec![TranscriptSegment {
                    start: 0.0,
                    end: 1.0,
                    text: "heard you".to_string(),
                }],
            })
        }
    }

    #[tokio::test]
    async fn test_transcribe_bytes_stages_file() {
        let transcriber = SpeechTranscriber::new(Arc::new(FixedRecognizer));
        let result = transcriber.transcribe_bytes(b"pcm-data", "en").await.unwrap();
        assert_eq!(result.text, "heard you");
    }
}

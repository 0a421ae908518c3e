pub mod whisper;

pub use whisper::WhisperClient;

use crate::audio::AudioChunk;
use crate::error::Result;
use async_trait::async_trait;

/// One recognized utterance, with chunk-local timestamps in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    /// A segment is usable when its times are ordered and it carries text.
    pub fn is_valid(&self) -> bool {
        self.end > self.start && !self.text.trim().is_empty()
    }
}

/// Raw engine output for one chunk.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

/// Speech-to-text engine interface.
///
/// With `target_lang` set and different from `source_lang` the engine runs
/// in translation mode (source speech rendered into the target, English in
/// practice); otherwise transcription pinned to `source_lang`. Errors abort
/// the current video; this stage does not retry.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(
        &self,
        chunk: &AudioChunk,
        source_lang: &str,
        target_lang: Option<&str>,
    ) -> Result<Recognition>;
}

/// Recognition mode chosen for a whole video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizeMode {
    /// Transcribe in the source language.
    Transcribe,
    /// Translate source speech to English.
    TranslateToEnglish,
}

impl RecognizeMode {
    /// The `target_lang` argument to pass to [`Recognizer::recognize`].
    pub fn target_lang(&self) -> Option<&'static str> {
        match self {
            RecognizeMode::Transcribe => None,
            RecognizeMode::TranslateToEnglish => Some("en"),
        }
    }
}

/// Pick the engine mode for a video.
///
/// Translation is only meaningful for non-English sources; an English
/// source with translation enabled is already in the target language, so
/// it stays in transcription mode.
pub fn select_mode(prompt_lang: &str, enable_translation: bool) -> RecognizeMode {
    if enable_translation && prompt_lang != "en" {
        RecognizeMode::TranslateToEnglish
    } else {
        RecognizeMode::Transcribe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_policy_table() {
        assert_eq!(select_mode("de", true), RecognizeMode::TranslateToEnglish);
        assert_eq!(select_mode("ja", true), RecognizeMode::TranslateToEnglish);
        assert_eq!(select_mode("en", true), RecognizeMode::Transcribe);
        assert_eq!(select_mode("de", false), RecognizeMode::Transcribe);
        assert_eq!(select_mode("en", false), RecognizeMode::Transcribe);
    }

    #[test]
    fn test_mode_target_lang() {
        assert_eq!(RecognizeMode::TranslateToEnglish.target_lang(), Some("en"));
        assert_eq!(RecognizeMode::Transcribe.target_lang(), None);
    }

    #[test]
    fn test_segment_validity() {
        let good = TranscriptSegment {
            start: 1.0,
            end: 2.0,
            text: "hello".to_string(),
        };
        assert!(good.is_valid());

        let inverted = TranscriptSegment {
            start: 2.0,
            end: 1.0,
            text: "hello".to_string(),
        };
        assert!(!inverted.is_valid());

        let blank = TranscriptSegment {
            start: 1.0,
            end: 2.0,
            text: "   ".to_string(),
        };
        assert!(!blank.is_valid());
    }
}

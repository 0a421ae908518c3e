use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidscribeError {
    #[error("Audio chunking failed: {0}")]
    Chunking(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Chat request failed: {0}")]
    Chat(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Engine timeout: {0}")]
    EngineTimeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VidscribeError {
    /// Transient errors are retried by the translation stage; everything
    /// else aborts the attempt loop immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VidscribeError::RateLimited(_) | VidscribeError::EngineTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VidscribeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(VidscribeError::RateLimited("429".into()).is_transient());
        assert!(VidscribeError::EngineTimeout("t".into()).is_transient());
        assert!(!VidscribeError::Translation("bad".into()).is_transient());
        assert!(!VidscribeError::Recognition("bad".into()).is_transient());
    }
}

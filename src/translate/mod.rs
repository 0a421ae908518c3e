pub mod chat;

pub use chat::ChatTranslator;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Full-document subtitle translator.
///
/// Failure here is recoverable per language: the orchestrator logs it and
/// carries on with the remaining languages and the video itself.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

/// Bounded retry with exponential backoff for transient engine errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failed attempt `attempt` (0-based):
    /// base, 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![60, 120, 240, 480, 960]);
    }
}

//! Subtitle translation through a chat-completion language model.

use crate::error::{Result, VidscribeError};
use crate::translate::{RetryPolicy, Translator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

const CHAT_MODEL: &str = "gpt-4";

/// Low temperature favors deterministic, format-preserving output.
const TRANSLATION_TEMPERATURE: f64 = 0.3;

/// Translator that submits the full subtitle document to a chat model.
///
/// Rate-limit and timeout errors are retried with exponential backoff up
/// to the policy's attempt bound; any other error aborts immediately.
pub struct ChatTranslator {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl ChatTranslator {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com".to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy (tests use millisecond delays).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn system_prompt(target_lang: &str) -> String {
        format!(
            "Translate the following subtitles to {target_lang}. \
             Preserve timestamps and subtitle formatting exactly."
        )
    }

    async fn call_once(&self, text: &str, target_lang: &str) -> Result<String> {
        let request = ChatRequest {
            model: CHAT_MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: Self::system_prompt(target_lang),
                },
                ChatMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            temperature: TRANSLATION_TEMPERATURE,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VidscribeError::EngineTimeout(e.to_string())
                } else {
                    VidscribeError::Http(e)
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(VidscribeError::RateLimited(format!(
                "translation engine returned {status}"
            )));
        }
        if status.as_u16() == 408 || status.as_u16() == 504 {
            return Err(VidscribeError::EngineTimeout(format!(
                "translation engine returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VidscribeError::Translation(format!(
                "translation engine error ({status}): {body}"
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .unwrap_or_default();

        let content = content.trim();
        if content.is_empty() {
            return Err(VidscribeError::Translation(
                "empty response from translation engine".to_string(),
            ));
        }
        Ok(content.to_string())
    }
}

#[async_trait]
impl Translator for ChatTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.retry.max_attempts {
            match self.call_once(text, target_lang).await {
                Ok(translated) => return Ok(translated),
                Err(e) if e.is_transient() => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Transient translation error ({}). Waiting {:?} before retrying... \
                         (attempt {}/{})",
                        e,
                        delay,
                        attempt + 1,
                        self.retry.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("Unexpected error during translation: {}", e);
                    return Err(e);
                }
            }
        }

        error!(
            "Translation to {} failed after {} attempts",
            target_lang, self.retry.max_attempts
        );
        Err(last_error.unwrap_or_else(|| {
            VidscribeError::Translation(format!(
                "translation to {target_lang} failed after all retry attempts"
            ))
        }))
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: &'static str,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_names_language() {
        let prompt = ChatTranslator::system_prompt("de");
        assert!(prompt.contains("de"));
        assert!(prompt.contains("Preserve timestamps"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let translator =
            ChatTranslator::with_base_url("k".to_string(), "http://localhost:9999/".to_string());
        assert_eq!(translator.base_url, "http://localhost:9999");
    }
}

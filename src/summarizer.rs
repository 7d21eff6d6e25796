//! LLM-backed summarization of extracted paper text.
//!
//! Gates on a minimum text length before spending API quota, truncates the
//! payload to a single call's worth, and converts every remote failure into
//! a fixed sentinel string so the pipeline never sees an unhandled fault
//! from the summarization service.

use crate::error::{DigestError, Result};
use crate::prompts::summarize::{build_payload, SYSTEM_PROMPT};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Sentinel returned below the minimum-length gate.
pub const INSUFFICIENT_TEXT_SENTINEL: &str = "Insufficient text for summarization.";

/// Sentinel returned when the remote API fails.
pub const API_ERROR_SENTINEL: &str = "Error generating summary.";

/// Summarizer configuration
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Below this many characters the remote API is never called
    pub min_chars: usize,
    /// Payload ceiling per request; longer text is truncated
    pub max_payload_chars: usize,
}

impl SummarizerConfig {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url,
            api_key,
            model,
            min_chars: 1000,
            max_payload_chars: 4000,
        }
    }
}

/// The HTTP leg of a summarization call, behind a trait so tests can count
/// and fake remote interactions.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one system + user message pair, returning the assistant reply.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// OpenAI-compatible API response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Production transport against an OpenAI-compatible `/chat/completions`
/// endpoint.
pub struct HttpChatTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpChatTransport {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DigestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": 0.2,
        });

        let api_url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(DigestError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DigestError::RemoteApi(format!(
                "{} - {}",
                status, error_text
            )));
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| DigestError::RemoteApi(format!("Unparseable response: {}", e)))?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| DigestError::RemoteApi("Response carried no choices".to_string()))
    }
}

/// Produces a natural-language summary of paper text via a remote API.
pub struct Summarizer {
    transport: Box<dyn ChatTransport>,
    min_chars: usize,
    max_payload_chars: usize,
}

impl Summarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        Ok(Self {
            transport: Box::new(HttpChatTransport::new(config)?),
            min_chars: config.min_chars,
            max_payload_chars: config.max_payload_chars,
        })
    }

    /// Build a summarizer over a custom transport; used by tests and any
    /// caller substituting the remote service.
    pub fn with_transport(
        transport: Box<dyn ChatTransport>,
        min_chars: usize,
        max_payload_chars: usize,
    ) -> Self {
        Self {
            transport,
            min_chars,
            max_payload_chars,
        }
    }

    /// Summarize `text`, or return a sentinel.
    ///
    /// Text shorter than the configured minimum returns
    /// [`INSUFFICIENT_TEXT_SENTINEL`] without any remote call. Remote
    /// failures return [`API_ERROR_SENTINEL`]; this method never errors.
    pub async fn summarize(&self, text: &str) -> String {
        let char_count = text.chars().count();
        if char_count < self.min_chars {
            info!(
                chars = char_count,
                min_chars = self.min_chars,
                "Text below summarization threshold, skipping remote call"
            );
            return INSUFFICIENT_TEXT_SENTINEL.to_string();
        }

        let payload = build_payload(text, self.max_payload_chars);
        debug!(
            chars = char_count,
            payload_chars = payload.chars().count(),
            "Requesting summary"
        );

        match self.transport.complete(SYSTEM_PROMPT, payload).await {
            Ok(summary) => {
                info!(summary_chars = summary.len(), "Summary generated");
                summary
            }
            Err(e) => {
                warn!(error = %e, "Summarization API failed");
                API_ERROR_SENTINEL.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTransport {
        calls: Arc<AtomicUsize>,
        reply: Result<&'static str>,
    }

    #[async_trait]
    impl ChatTransport for CountingTransport {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(!user.is_empty());
            match &self.reply {
                Ok(s) => Ok(s.to_string()),
                Err(_) => Err(DigestError::RemoteApi("quota exceeded".to_string())),
            }
        }
    }

    fn summarizer_with(
        reply: Result<&'static str>,
        min_chars: usize,
    ) -> (Summarizer, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = CountingTransport {
            calls: Arc::clone(&calls),
            reply,
        };
        (
            Summarizer::with_transport(Box::new(transport), min_chars, 4000),
            calls,
        )
    }

    #[tokio::test]
    async fn test_short_text_returns_sentinel_without_remote_call() {
        let (summarizer, calls) = summarizer_with(Ok("unused"), 1000);
        let summary = summarizer.summarize("too short").await;
        assert_eq!(summary, INSUFFICIENT_TEXT_SENTINEL);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_long_text_summarized_once() {
        let (summarizer, calls) = summarizer_with(Ok("A concise summary."), 1000);
        let text = "science ".repeat(200);
        let summary = summarizer.summarize(&text).await;
        assert_eq!(summary, "A concise summary.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_becomes_sentinel() {
        let (summarizer, calls) = summarizer_with(
            Err(DigestError::RemoteApi("down".to_string())),
            1000,
        );
        let text = "data ".repeat(300);
        let summary = summarizer.summarize(&text).await;
        assert_eq!(summary, API_ERROR_SENTINEL);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_payload_truncated_to_ceiling() {
        struct LenTransport {
            seen: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl ChatTransport for LenTransport {
            async fn complete(&self, _system: &str, user: &str) -> Result<String> {
                self.seen.store(user.chars().count(), Ordering::SeqCst);
                Ok("ok".to_string())
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let summarizer = Summarizer::with_transport(
            Box::new(LenTransport {
                seen: Arc::clone(&seen),
            }),
            1000,
            4000,
        );
        let text = "x".repeat(10_000);
        summarizer.summarize(&text).await;
        assert_eq!(seen.load(Ordering::SeqCst), 4000);
    }
}

/// LLM Client: the single point of entry for all chat-model calls in the mentor API.
///
/// ARCHITECTURAL RULE: No other module may call a provider API directly.
/// All LLM interactions MUST go through this module.
///
/// Every supported provider (Qwen, DeepSeek, Zhipu, OpenAI) speaks the
/// OpenAI-compatible `/chat/completions` protocol, so one client covers them all.
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;

pub mod parse;
pub mod prompts;
pub mod stream;

use stream::{SseLineDecoder, StreamSignal};

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("No LLM provider has an API key configured")]
    NotConfigured,
}

/// Chat-completion vendors, listed in fallback priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Qwen,
    Deepseek,
    Zhipu,
    Openai,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Qwen,
        Provider::Deepseek,
        Provider::Zhipu,
        Provider::Openai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Qwen => "qwen",
            Provider::Deepseek => "deepseek",
            Provider::Zhipu => "zhipu",
            Provider::Openai => "openai",
        }
    }

    pub fn env_prefix(&self) -> &'static str {
        match self {
            Provider::Qwen => "QWEN",
            Provider::Deepseek => "DEEPSEEK",
            Provider::Zhipu => "ZHIPU",
            Provider::Openai => "OPENAI",
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            Provider::Qwen => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            Provider::Deepseek => "https://api.deepseek.com/v1",
            Provider::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
            Provider::Openai => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Qwen => "qwen-max",
            Provider::Deepseek => "deepseek-chat",
            Provider::Zhipu => "glm-4",
            Provider::Openai => "gpt-3.5-turbo",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown LLM provider '{s}'"))
    }
}

/// The provider actually used after fallback resolution.
#[derive(Debug, Clone)]
struct ActiveProvider {
    provider: Provider,
    api_key: String,
    api_base: String,
    model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content of the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// The single LLM client used by all services.
/// Wraps the chat-completions API with retry logic, structured output and streaming helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    active: Option<ActiveProvider>,
    max_tokens: u32,
}

impl LlmClient {
    /// Resolves which provider to use: the configured one if it has a key,
    /// otherwise the first keyed provider in priority order. With no keys at all
    /// the client is built unconfigured so the service can still start.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let keyed = |p: Provider| {
            config
                .providers
                .iter()
                .find(|s| s.provider == p)
                .and_then(|s| {
                    s.api_key.as_ref().map(|key| ActiveProvider {
                        provider: s.provider,
                        api_key: key.clone(),
                        api_base: s.api_base.trim_end_matches('/').to_string(),
                        model: s.model.clone(),
                    })
                })
        };

        let active = keyed(config.llm_provider).or_else(|| {
            warn!(
                "{} API key not configured, trying other providers",
                config.llm_provider
            );
            Provider::ALL.into_iter().find_map(keyed)
        });

        match &active {
            Some(a) if a.provider != config.llm_provider => {
                info!("Falling back to LLM provider {} ({})", a.provider, a.model)
            }
            Some(_) => {}
            None => warn!("No LLM API key configured; AI features are disabled"),
        }

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
            active,
            max_tokens: config.llm_max_tokens,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.active.is_some()
    }

    pub fn provider(&self) -> Option<Provider> {
        self.active.as_ref().map(|a| a.provider)
    }

    pub fn model(&self) -> &str {
        self.active.as_ref().map(|a| a.model.as_str()).unwrap_or("none")
    }

    /// Sends a chat request, retrying on 429 (rate limit) and 5xx errors with
    /// exponential backoff. Returns the successful HTTP response.
    async fn send(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let active = self.active.as_ref().ok_or(LlmError::NotConfigured)?;
        let body = ChatRequest {
            model: &active.model,
            messages,
            temperature,
            max_tokens: self.max_tokens,
            stream,
        };
        let url = format!("{}/chat/completions", active.api_base);

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(&active.api_key)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ProviderError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }

        Err(retries_exhausted(last_error))
    }

    /// Makes a raw chat call, returning the full response object.
    pub async fn call(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.send(messages, temperature, false).await?;
        let llm_response: LlmResponse = response.json().await?;

        if let Some(usage) = &llm_response.usage {
            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(llm_response)
    }

    /// Single-turn completion returning trimmed text.
    pub async fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        let response = self.call(&messages, temperature).await?;
        response
            .text()
            .map(|t| t.trim().to_string())
            .ok_or(LlmError::EmptyContent)
    }

    /// Streams content fragments as the provider produces them.
    ///
    /// The returned stream ends at `data: [DONE]` or when the connection closes.
    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let response = self.send(messages, temperature, true).await?;

        struct State {
            bytes: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
            decoder: SseLineDecoder,
            pending: VecDeque<String>,
            done: bool,
        }

        let state = State {
            bytes: response.bytes_stream().boxed(),
            decoder: SseLineDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(fragment) = st.pending.pop_front() {
                    return Some((Ok(fragment), st));
                }
                if st.done {
                    return None;
                }
                let signals = match st.bytes.next().await {
                    Some(Ok(chunk)) => st.decoder.push(&chunk),
                    Some(Err(e)) => {
                        st.done = true;
                        return Some((Err(LlmError::Http(e)), st));
                    }
                    None => {
                        st.done = true;
                        st.decoder.finish()
                    }
                };
                for signal in signals {
                    match signal {
                        StreamSignal::Fragment(text) => st.pending.push_back(text),
                        StreamSignal::Done => {
                            st.done = true;
                            break;
                        }
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}

/// The error reported once every attempt failed. A final 429 surfaces as
/// `RateLimited` so callers can tell throttling from provider faults.
fn retries_exhausted(last_error: Option<LlmError>) -> LlmError {
    match last_error {
        Some(LlmError::Api { status: 429, .. }) | None => LlmError::RateLimited {
            retries: MAX_RETRIES,
        },
        Some(other) => other,
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;

    fn config_with_keys(preferred: Provider, keys: &[(Provider, &str)]) -> Config {
        let providers = Provider::ALL
            .iter()
            .map(|&p| ProviderSettings {
                provider: p,
                api_key: keys
                    .iter()
                    .find(|(k, _)| *k == p)
                    .map(|(_, v)| v.to_string()),
                api_base: format!("{}/", p.default_api_base()),
                model: p.default_model().to_string(),
            })
            .collect();
        Config {
            database_url: String::new(),
            db_max_connections: 1,
            redis_url: String::new(),
            s3_bucket: String::new(),
            s3_endpoint: String::new(),
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
            port: 8080,
            rust_log: "info".into(),
            llm_provider: preferred,
            providers,
            llm_temperature: 0.7,
            llm_max_tokens: 2000,
            embedding_api_key: None,
            embedding_api_base: String::new(),
            embedding_model: String::new(),
            vector_dimension: 8,
            chunk_size: 100,
            chunk_overlap: 10,
            cache_expire_minutes: 30,
            max_document_bytes: 1024,
        }
    }

    #[test]
    fn test_final_429_is_reported_as_rate_limited() {
        let err = retries_exhausted(Some(LlmError::Api {
            status: 429,
            message: "slow down".into(),
        }));
        assert!(matches!(err, LlmError::RateLimited { retries: MAX_RETRIES }));

        let err = retries_exhausted(Some(LlmError::Api {
            status: 503,
            message: "overloaded".into(),
        }));
        assert!(matches!(err, LlmError::Api { status: 503, .. }));
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_provider_parses_case_insensitively() {
        assert_eq!("DeepSeek".parse::<Provider>().unwrap(), Provider::Deepseek);
        assert!("claude".parse::<Provider>().is_err());
    }

    #[test]
    fn test_preferred_provider_used_when_keyed() {
        let config = config_with_keys(
            Provider::Zhipu,
            &[(Provider::Qwen, "q"), (Provider::Zhipu, "z")],
        );
        let client = LlmClient::from_config(&config).unwrap();
        assert_eq!(client.provider(), Some(Provider::Zhipu));
        assert_eq!(client.model(), "glm-4");
    }

    #[test]
    fn test_falls_back_in_priority_order() {
        let config = config_with_keys(
            Provider::Qwen,
            &[(Provider::Openai, "o"), (Provider::Deepseek, "d")],
        );
        let client = LlmClient::from_config(&config).unwrap();
        assert_eq!(client.provider(), Some(Provider::Deepseek));
    }

    #[test]
    fn test_unconfigured_client_still_builds() {
        let config = config_with_keys(Provider::Qwen, &[]);
        let client = LlmClient::from_config(&config).unwrap();
        assert!(!client.is_configured());
        assert_eq!(client.model(), "none");
    }

    #[tokio::test]
    async fn test_unconfigured_client_rejects_calls() {
        let client = LlmClient::from_config(&config_with_keys(Provider::Qwen, &[])).unwrap();
        let err = client.complete("sys", "hi", 0.3).await.unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let config = config_with_keys(Provider::Openai, &[(Provider::Openai, "o")]);
        let client = LlmClient::from_config(&config).unwrap();
        let base = client.active.as_ref().map(|a| a.api_base.clone()).unwrap();
        assert!(!base.ends_with('/'));
    }

    #[test]
    fn test_response_text_skips_blank_content() {
        let response: LlmResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"   "}}],"usage":null}"#,
        )
        .unwrap();
        assert!(response.text().is_none());
    }
}

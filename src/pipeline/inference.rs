//! Inference: one chat-completion call per page against an OpenAI-compatible API.
//!
//! [`InferenceClient`] is the seam between the orchestrator and the network.
//! The production implementation, [`OpenAiCompatibleClient`], posts to
//! `{base_url}/chat/completions`; tests substitute in-memory fakes.
//!
//! ## Request shape
//!
//! A single user message whose content is a text part (the prompt) followed
//! by an `image_url` part holding the page as a `data:` URL. Sampling knobs
//! travel as top-level fields; `repetition_penalty` is not part of the
//! OpenAI schema but vLLM-style servers read it from the same place, and
//! strict servers ignore unknown fields.
//!
//! The client performs exactly one HTTP call per [`InferenceClient::complete`].
//! Retry and per-call timeout policy live in the orchestrator, which knows
//! the page number and the job's options.

use crate::config::{EndpointConfig, OcrOptions};
use crate::error::InferenceError;
use crate::pipeline::encode::ImagePayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Maximum number of bytes of an error body kept in [`InferenceError::Status`].
const ERROR_BODY_LIMIT: usize = 512;

/// Everything needed for one page's inference call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub image: ImagePayload,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl ChatRequest {
    /// Request for `prompt` + `image` using the sampling settings in `options`.
    pub fn new(options: &OcrOptions, prompt: String, image: ImagePayload) -> Self {
        Self {
            model: options.model.clone(),
            prompt,
            image,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            repetition_penalty: options.repetition_penalty,
        }
    }

    /// The JSON body sent to `/chat/completions`.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": self.prompt },
                    { "type": "image_url", "image_url": { "url": self.image.data_url() } },
                ],
            }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "repetition_penalty": self.repetition_penalty,
        })
    }
}

/// Token accounting reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    /// `total_tokens`, or the sum of the parts when the endpoint leaves it at zero.
    pub fn total(&self) -> u64 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        }
    }
}

/// The generated text of one call plus its usage, when reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Tokens consumed by this call; absent usage counts as zero.
    pub fn tokens(&self) -> u64 {
        self.usage.map(|u| u.total()).unwrap_or(0)
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Perform one completion call.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, InferenceError>;

    /// Models this backend offers, for listing in user interfaces.
    fn models(&self) -> Vec<String> {
        Vec::new()
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Parse a `/chat/completions` response body.
pub fn parse_completion(body: &str) -> Result<ChatCompletion, InferenceError> {
    let response: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::EmptyChoices)?;

    Ok(ChatCompletion {
        content: choice.message.content.unwrap_or_default(),
        usage: response.usage,
    })
}

// ── OpenAI-compatible client ─────────────────────────────────────────────

/// [`InferenceClient`] for any server speaking the OpenAI chat-completions API.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
    models: Vec<String>,
}

impl OpenAiCompatibleClient {
    /// Build a client for `endpoint`.
    ///
    /// `timeout_secs` bounds each HTTP exchange at the transport level; the
    /// orchestrator applies its own per-call timeout on top.
    pub fn new(endpoint: EndpointConfig, timeout_secs: u64) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;
        let models = vec![endpoint.model.clone()];
        Ok(Self {
            http,
            endpoint,
            models,
        })
    }

    /// Replace the advertised model list.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        if !models.is_empty() {
            self.models = models;
        }
        self
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.endpoint.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl InferenceClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, InferenceError> {
        let url = self.completions_url();
        debug!(
            "POST {} model={} prompt={} chars image={} bytes",
            url,
            request.model,
            request.prompt.len(),
            request.image.base64.len()
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.endpoint.api_key)
            .json(&request.to_body())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        parse_completion(&body)
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }
}

fn transport_error(e: reqwest::Error) -> InferenceError {
    if e.is_timeout() {
        // reqwest does not report the configured duration; zero marks "transport timeout".
        InferenceError::Timeout { secs: 0 }
    } else {
        InferenceError::Transport(e.to_string())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChatRequest {
        ChatRequest::new(
            &OcrOptions::default(),
            "Read this page".into(),
            ImagePayload {
                base64: "AAAA".into(),
                mime_type: "image/png",
            },
        )
    }

    #[test]
    fn body_carries_prompt_image_and_sampling() {
        let body = request().to_body();
        assert_eq!(body["model"], "typhoon-ocr");
        assert_eq!(body["max_tokens"], 16384);
        let content = &body["messages"][0]["content"];
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "Read this page");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert!((body["repetition_penalty"].as_f64().unwrap() - 1.2).abs() < 1e-6);
        assert!((body["top_p"].as_f64().unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn parses_content_and_usage() {
        let c = parse_completion(
            r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        )
        .unwrap();
        assert_eq!(c.content, "hi");
        assert_eq!(c.tokens(), 15);
    }

    #[test]
    fn missing_usage_counts_as_zero() {
        let c = parse_completion(r#"{"choices":[{"message":{"content":"x"}}]}"#).unwrap();
        assert_eq!(c.usage, None);
        assert_eq!(c.tokens(), 0);
    }

    #[test]
    fn total_falls_back_to_parts() {
        let u = Usage {
            prompt_tokens: 7,
            completion_tokens: 3,
            total_tokens: 0,
        };
        assert_eq!(u.total(), 10);
    }

    #[test]
    fn empty_choices_and_garbage_are_errors() {
        assert_eq!(
            parse_completion(r#"{"choices":[]}"#).unwrap_err(),
            InferenceError::EmptyChoices
        );
        assert!(matches!(
            parse_completion("<html>").unwrap_err(),
            InferenceError::MalformedResponse(_)
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        let t = truncate("ééééé", 3);
        assert!(t.starts_with('é'));
        assert!(t.ends_with('…'));
    }

    #[test]
    fn completions_url_joins_base() {
        let client = OpenAiCompatibleClient::new(
            EndpointConfig::new("http://localhost:8000/v1/", "k", "m"),
            5,
        )
        .unwrap();
        assert_eq!(client.completions_url(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(client.models(), vec!["m".to_string()]);
    }
}

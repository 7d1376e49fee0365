//! Configuration types for OCR jobs.
//!
//! Two pieces of configuration with different lifetimes:
//!
//! * [`EndpointConfig`]: where the inference endpoint lives and how to
//!   authenticate. Read once at process start from the environment (and a
//!   `.env` file if present), never re-validated afterwards.
//!
//! * [`OcrOptions`]: per-job knobs (model, task type, sampling, page range).
//!   Created with defaults at session start, changed by the user between
//!   jobs, and read-only while a job is in flight. Built via
//!   [`OcrOptions::builder()`], whose setters clamp to the documented ranges.

use crate::error::OcrError;
use crate::pages::range::{self, PageSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model used when neither the environment nor the caller names one.
pub const DEFAULT_MODEL: &str = "typhoon-ocr";

/// Environment variable holding the endpoint base URL (e.g. `https://api.example.com/v1`).
pub const ENV_BASE_URL: &str = "TYPHOON_BASE_URL";
/// Environment variable holding the endpoint API key.
pub const ENV_API_KEY: &str = "TYPHOON_API_KEY";
/// Environment variable overriding the default model.
pub const ENV_MODEL: &str = "TYPHOON_OCR_MODEL";

/// Connection settings for the OpenAI-compatible inference endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Base URL up to and including the API version segment; `/chat/completions` is appended.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl EndpointConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Load from `TYPHOON_BASE_URL`, `TYPHOON_API_KEY` and `TYPHOON_OCR_MODEL`.
    ///
    /// A `.env` file in the working directory is loaded first if it exists;
    /// variables already set in the process environment win.
    pub fn from_env() -> Result<Self, OcrError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, OcrError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = non_empty(ENV_BASE_URL).ok_or_else(|| OcrError::ProviderNotConfigured {
            hint: format!("Set {ENV_BASE_URL} to the endpoint base URL (e.g. https://host/v1)."),
        })?;
        let api_key = non_empty(ENV_API_KEY).ok_or_else(|| OcrError::ProviderNotConfigured {
            hint: format!("Set {ENV_API_KEY} to your API key."),
        })?;
        let model = non_empty(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

/// Per-job OCR options.
///
/// # Example
/// ```rust
/// use typhoon_ocr::{OcrOptions, TaskType};
///
/// let options = OcrOptions::builder()
///     .task_type(TaskType::Structure)
///     .temperature(0.2)
///     .page_range("1-3,7")
///     .build()
///     .unwrap();
/// assert_eq!(options.page_set().len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrOptions {
    /// Model identifier sent with every request. Default: `typhoon-ocr`.
    pub model: String,

    /// Prompt template and expected output shape. Default: [`TaskType::Default`].
    pub task_type: TaskType,

    /// Sampling temperature. Range: 0.0–1.0. Default: 0.1.
    ///
    /// Transcription wants the model to be faithful to the page, not creative.
    pub temperature: f32,

    /// Nucleus sampling cutoff. Range: 0.0–1.0. Default: 0.6.
    pub top_p: f32,

    /// Penalty on repeated tokens. Range: 1.0–2.0. Default: 1.2.
    ///
    /// OCR models tend to loop on tables with many identical cells; a mild
    /// penalty stops the loop without distorting normal text.
    pub repetition_penalty: f32,

    /// Maximum tokens generated per page. Range: 1–32768. Default: 16384.
    pub max_tokens: u32,

    /// Page-range string (`"1,3,5-7"`). `None` or empty means all pages.
    pub page_range: Option<String>,

    /// Retries per page on transient inference errors. Default: 5.
    pub max_retries: u32,

    /// First retry delay in milliseconds; doubles on each attempt. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Timeout for a single inference call, in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Longest edge of the image sent to the model, in pixels. Default: 1800.
    pub image_dim: u32,

    /// Maximum characters of page text embedded in the prompt. Default: 8000.
    pub anchor_text_len: usize,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            task_type: TaskType::default(),
            temperature: 0.1,
            top_p: 0.6,
            repetition_penalty: 1.2,
            max_tokens: 16384,
            page_range: None,
            max_retries: 5,
            retry_backoff_ms: 1000,
            request_timeout_secs: 120,
            image_dim: 1800,
            anchor_text_len: 8000,
        }
    }
}

impl OcrOptions {
    /// Create a new builder for `OcrOptions`.
    pub fn builder() -> OcrOptionsBuilder {
        OcrOptionsBuilder {
            options: Self::default(),
        }
    }

    /// A builder starting from these options instead of the defaults.
    pub fn to_builder(&self) -> OcrOptionsBuilder {
        OcrOptionsBuilder {
            options: self.clone(),
        }
    }

    /// The selected pages; empty means all pages.
    pub fn page_set(&self) -> PageSet {
        self.page_range
            .as_deref()
            .map(|s| range::parse(s, None))
            .unwrap_or_default()
    }

    /// Check every field against its documented range.
    pub fn validate(&self) -> Result<(), OcrError> {
        if self.model.trim().is_empty() {
            return Err(OcrError::InvalidConfig("model must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(OcrError::InvalidConfig(format!(
                "temperature must be 0.0–1.0, got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(OcrError::InvalidConfig(format!(
                "top_p must be 0.0–1.0, got {}",
                self.top_p
            )));
        }
        if !(1.0..=2.0).contains(&self.repetition_penalty) {
            return Err(OcrError::InvalidConfig(format!(
                "repetition_penalty must be 1.0–2.0, got {}",
                self.repetition_penalty
            )));
        }
        if self.max_tokens == 0 || self.max_tokens > 32768 {
            return Err(OcrError::InvalidConfig(format!(
                "max_tokens must be 1–32768, got {}",
                self.max_tokens
            )));
        }
        if self.image_dim < 256 {
            return Err(OcrError::InvalidConfig(format!(
                "image_dim must be ≥ 256, got {}",
                self.image_dim
            )));
        }
        Ok(())
    }
}

/// Builder for [`OcrOptions`].
#[derive(Debug)]
pub struct OcrOptionsBuilder {
    options: OcrOptions,
}

impl OcrOptionsBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = model.into();
        self
    }

    pub fn task_type(mut self, task: TaskType) -> Self {
        self.options.task_type = task;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.options.temperature = t.clamp(0.0, 1.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.options.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn repetition_penalty(mut self, p: f32) -> Self {
        self.options.repetition_penalty = p.clamp(1.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.options.max_tokens = n.clamp(1, 32768);
        self
    }

    /// Empty or whitespace-only strings clear the range (all pages).
    pub fn page_range(mut self, range: impl Into<String>) -> Self {
        let range = range.into();
        self.options.page_range = if range.trim().is_empty() {
            None
        } else {
            Some(range)
        };
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.options.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.options.retry_backoff_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.options.request_timeout_secs = secs.max(1);
        self
    }

    pub fn image_dim(mut self, px: u32) -> Self {
        self.options.image_dim = px.max(256);
        self
    }

    pub fn anchor_text_len(mut self, n: usize) -> Self {
        self.options.anchor_text_len = n;
        self
    }

    /// Build the options, validating constraints.
    pub fn build(self) -> Result<OcrOptions, OcrError> {
        self.options.validate()?;
        Ok(self.options)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which prompt template to use and what output shape to expect.
///
/// | Task | Output |
/// |------|--------|
/// | `default`   | Markdown, tables as Markdown |
/// | `structure` | Markdown, tables as HTML, figures described in `<figure>` tags |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Default,
    Structure,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Default => "default",
            TaskType::Structure => "structure",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(TaskType::Default),
            "structure" => Ok(TaskType::Structure),
            other => Err(OcrError::InvalidConfig(format!(
                "unknown task type '{other}' (expected 'default' or 'structure')"
            ))),
        }
    }
}

/// How to separate pages in the combined view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Blank line between pages. (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before page `page_num` (1-indexed).
    pub fn render(&self, page_num: u32) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}

impl FromStr for PageSeparator {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "none" | "" => PageSeparator::None,
            "hr" | "---" => PageSeparator::HorizontalRule,
            "comment" => PageSeparator::Comment,
            _ => PageSeparator::Custom(s.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let o = OcrOptions::default();
        assert_eq!(o.model, "typhoon-ocr");
        assert_eq!(o.task_type, TaskType::Default);
        assert_eq!(o.temperature, 0.1);
        assert_eq!(o.top_p, 0.6);
        assert_eq!(o.repetition_penalty, 1.2);
        assert_eq!(o.max_tokens, 16384);
        assert!(o.page_set().is_empty());
        assert!(o.validate().is_ok());
    }

    #[test]
    fn builder_clamps_out_of_range_values() {
        let o = OcrOptions::builder()
            .temperature(3.0)
            .top_p(-1.0)
            .repetition_penalty(0.5)
            .max_tokens(0)
            .build()
            .unwrap();
        assert_eq!(o.temperature, 1.0);
        assert_eq!(o.top_p, 0.0);
        assert_eq!(o.repetition_penalty, 1.0);
        assert_eq!(o.max_tokens, 1);
    }

    #[test]
    fn validate_rejects_hand_edited_fields() {
        let o = OcrOptions {
            top_p: 1.5,
            ..OcrOptions::default()
        };
        assert!(matches!(o.validate(), Err(OcrError::InvalidConfig(_))));

        let o = OcrOptions {
            model: "  ".into(),
            ..OcrOptions::default()
        };
        assert!(o.validate().is_err());
    }

    #[test]
    fn blank_page_range_means_all() {
        let o = OcrOptions::builder().page_range("   ").build().unwrap();
        assert_eq!(o.page_range, None);
        let o = OcrOptions::builder().page_range("2-3").build().unwrap();
        assert_eq!(o.page_set().iter().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn task_type_round_trips_through_str() {
        assert_eq!("Structure".parse::<TaskType>().unwrap(), TaskType::Structure);
        assert_eq!(TaskType::Default.to_string(), "default");
        assert!("tables".parse::<TaskType>().is_err());
        assert_eq!(
            serde_json::to_string(&TaskType::Structure).unwrap(),
            "\"structure\""
        );
    }

    #[test]
    fn endpoint_from_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_BASE_URL, "https://api.example.com/v1/"),
            (ENV_API_KEY, "sk-test"),
        ]
        .into_iter()
        .collect();
        let cfg = EndpointConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.base_url, "https://api.example.com/v1");
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert!(!format!("{cfg:?}").contains("sk-test"));
    }

    #[test]
    fn endpoint_requires_key() {
        let err = EndpointConfig::from_lookup(|k| {
            (k == ENV_BASE_URL).then(|| "https://api.example.com/v1".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_API_KEY));
    }

    #[test]
    fn separator_parsing_and_rendering() {
        assert_eq!("hr".parse::<PageSeparator>().unwrap(), PageSeparator::HorizontalRule);
        assert_eq!(PageSeparator::Comment.render(4), "\n\n<!-- page 4 -->\n\n");
        assert_eq!(
            "===".parse::<PageSeparator>().unwrap().render(2),
            "\n\n===\n\n"
        );
    }
}

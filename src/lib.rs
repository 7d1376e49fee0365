//! # typhoon-ocr
//!
//! OCR PDFs and images with an OpenAI-compatible vision-language model.
//!
//! ## Why this crate?
//!
//! Vision-language OCR models read a rendered page the way a person does,
//! so they keep tables, reading order and mixed scripts intact where
//! classic text extraction falls apart. What is left to the caller is the
//! plumbing: pick pages, render them, send one request per page, survive the
//! pages that fail, and add up what it cost. This crate is that plumbing.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / image
//!  │
//!  ├─ 1. Input    local file, direct URL fetch, or fetch through a relay
//!  ├─ 2. Select   page-range string ⇄ PageSet, click/shift-click/presets
//!  ├─ 3. Render   pdfium page → image (spawn_blocking), longest edge capped
//!  ├─ 4. Prompt   task template + page dimensions + text layer
//!  ├─ 5. Infer    one chat-completion call per page, strictly sequential
//!  ├─ 6. Parse    {"natural_text": ...} or the raw answer verbatim
//!  └─ 7. Output   per-page results, token and wall-clock totals
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use typhoon_ocr::{
//!     resolve_input, DocumentRenderer, EndpointConfig, OcrOptions,
//!     OpenAiCompatibleClient, Orchestrator, PageSeparator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // TYPHOON_BASE_URL / TYPHOON_API_KEY, optionally from .env
//!     let endpoint = EndpointConfig::from_env()?;
//!     let client = OpenAiCompatibleClient::new(endpoint, 120)?;
//!     let orchestrator = Orchestrator::new(Arc::new(client), Arc::new(DocumentRenderer::new()));
//!
//!     let document = resolve_input("report.pdf", None, 60).await?;
//!     let options = OcrOptions::builder().page_range("1-3").build()?;
//!     let result = orchestrator.run(Some(&document), &options, None).await;
//!
//!     println!("{}", result.combined(&PageSeparator::HorizontalRule));
//!     eprintln!("{} tokens in {:.2}s", result.total_tokens, result.processing_time);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | via cli | axum HTTP surface ([`server`]) |
//! | `cli`    | on      | the `typhoon-ocr` binary (clap + indicatif + tracing-subscriber) |
//!
//! Disable default features when using only the library:
//! ```toml
//! typhoon-ocr = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pages;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EndpointConfig, OcrOptions, OcrOptionsBuilder, PageSeparator, TaskType};
pub use error::{InferenceError, OcrError, PageError};
pub use orchestrator::{run_job, Orchestrator};
pub use output::{CompareView, OcrPageResult, OcrResult};
pub use pages::{PageSet, QuickSelect, Selection};
pub use pipeline::inference::{ChatCompletion, ChatRequest, InferenceClient, OpenAiCompatibleClient, Usage};
pub use pipeline::input::{fetch_remote, fetch_via_relay, load_local, resolve_input, Document, DocumentKind};
pub use pipeline::layout::{BoundingBox, PageLayout, TextElement};
pub use pipeline::render::{DocumentRenderer, PageRenderer, RenderedPage};
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
pub use session::{JobState, OcrSession};

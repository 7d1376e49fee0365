//! The OCR job: resolve pages, then render → prompt → infer → parse each one.
//!
//! ## Why strictly sequential?
//!
//! Vision models behind OpenAI-compatible endpoints are usually served from
//! a single GPU with tight rate limits. One request at a time keeps the job
//! inside those limits and makes the progress stream trivially ordered.
//!
//! ## Failure scopes
//!
//! Anything that stops the job before the first page (no document, invalid
//! options, unreadable PDF, empty page selection) becomes an [`OcrResult`]
//! with `success == false` and a top-level `error`. Anything that goes wrong
//! on one page becomes that page's [`OcrPageResult`] with `success == false`;
//! the job moves on and still reports `success == true`.
//!
//! ## Retry Strategy
//!
//! Transient inference errors (connection failures, timeouts, 429, 5xx) are
//! retried with exponential backoff, `retry_backoff_ms * 2^(attempt-1)`, up
//! to `max_retries` times. Other statuses fail the page on the first answer.

use crate::config::OcrOptions;
use crate::error::{InferenceError, OcrError, PageError};
use crate::output::{round_secs, OcrPageResult, OcrResult};
use crate::pipeline::encode::encode_page;
use crate::pipeline::inference::{ChatCompletion, ChatRequest, InferenceClient};
use crate::pipeline::input::Document;
use crate::pipeline::render::PageRenderer;
use crate::pipeline::response::parse_model_output;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::{anchor_text, build_prompt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Longest single backoff delay between retries.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Runs OCR jobs against one inference client and one renderer.
///
/// Cheap to clone; the session and the HTTP server each hold one.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn InferenceClient>,
    renderer: Arc<dyn PageRenderer>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn InferenceClient>, renderer: Arc<dyn PageRenderer>) -> Self {
        Self { client, renderer }
    }

    pub fn client(&self) -> &Arc<dyn InferenceClient> {
        &self.client
    }

    pub fn renderer(&self) -> &Arc<dyn PageRenderer> {
        &self.renderer
    }

    /// Page count of `document`, off the async runtime.
    pub async fn page_count(&self, document: &Document) -> Result<u32, OcrError> {
        let renderer = Arc::clone(&self.renderer);
        let document = document.clone();
        tokio::task::spawn_blocking(move || renderer.page_count(&document))
            .await
            .map_err(|e| OcrError::Internal(format!("page-count task failed: {e}")))?
    }

    /// Run one job to completion.
    ///
    /// Never returns an error: fatal problems are reported in the result.
    pub async fn run(
        &self,
        document: Option<&Document>,
        options: &OcrOptions,
        progress: Option<ProgressCallback>,
    ) -> OcrResult {
        let started = Instant::now();
        let progress = progress.unwrap_or_else(|| Arc::new(NoopProgressCallback));

        let (document, pages) = match self.plan(document, options).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("OCR job failed before processing: {}", e);
                return OcrResult::failure(&e, round_secs(started.elapsed().as_secs_f64()));
            }
        };

        let total = pages.len();
        info!(
            "Starting OCR: {} ({} page(s), task={}, model={})",
            document.name(),
            total,
            options.task_type,
            options.model
        );
        progress.on_job_start(total);

        let mut results = Vec::with_capacity(total);
        for &page in &pages {
            progress.on_page_start(page, total);
            let result = self.process_page(document, page, options).await;
            match &result.error {
                None => progress.on_page_complete(page, total, result.text.len()),
                Some(e) => progress.on_page_error(page, total, e),
            }
            results.push(result);
        }

        let success_count = results.iter().filter(|r| r.success).count();
        progress.on_job_complete(total, success_count);

        let result = OcrResult::from_pages(results, started.elapsed().as_secs_f64());
        info!(
            "OCR complete: {}/{} pages, {} tokens, {:.2}s",
            success_count, total, result.total_tokens, result.processing_time
        );
        result
    }

    /// Validate the job and resolve its ascending target page list.
    async fn plan<'d>(
        &self,
        document: Option<&'d Document>,
        options: &OcrOptions,
    ) -> Result<(&'d Document, Vec<u32>), OcrError> {
        let document = document.ok_or(OcrError::NoDocument)?;
        options.validate()?;

        let total_pages = self.page_count(document).await?;
        let pages = options.page_set().resolve(total_pages);
        if pages.is_empty() {
            return Err(OcrError::NoPagesSelected {
                total: total_pages as usize,
            });
        }
        debug!("Selected {:?} of {} pages", pages, total_pages);
        Ok((document, pages))
    }

    /// Process one page. Failures are recorded in the returned result.
    pub async fn process_page(
        &self,
        document: &Document,
        page: u32,
        options: &OcrOptions,
    ) -> OcrPageResult {
        let started = Instant::now();

        // ── Render ───────────────────────────────────────────────────────
        let renderer = Arc::clone(&self.renderer);
        let doc = document.clone();
        let max_dim = options.image_dim;
        let rendered = tokio::task::spawn_blocking(move || renderer.render_page(&doc, page, max_dim))
            .await
            .unwrap_or_else(|e| {
                Err(PageError::RenderFailed {
                    page,
                    detail: format!("render task failed: {e}"),
                })
            });

        let rendered = match rendered {
            Ok(r) => r,
            Err(e) => return page_failure(&e, page, None, started),
        };

        // ── Encode + prompt ──────────────────────────────────────────────
        let payload = match encode_page(&rendered.image) {
            Ok(p) => p,
            Err(e) => {
                let err = PageError::RenderFailed {
                    page,
                    detail: format!("image encoding failed: {e}"),
                };
                return page_failure(&err, page, None, started);
            }
        };
        let image_base64 = payload.base64.clone();
        let prompt = build_prompt(
            options.task_type,
            &anchor_text(&rendered, options.anchor_text_len),
        );
        let request = ChatRequest::new(options, prompt, payload);

        // ── Infer + parse ────────────────────────────────────────────────
        match self.complete_with_retry(&request, page, options).await {
            Ok(completion) => {
                let parsed = parse_model_output(&completion.content);
                if !parsed.structured {
                    debug!("Page {}: using raw model output", page);
                }
                let tokens = completion.tokens();
                let elapsed = started.elapsed();
                debug!(
                    "Page {}: {} chars, {} tokens, {:?}",
                    page,
                    parsed.text.len(),
                    tokens,
                    elapsed
                );
                OcrPageResult::succeeded(page, parsed.text, Some(image_base64), tokens)
                    .with_duration_ms(elapsed.as_millis() as u64)
            }
            Err(e) => page_failure(&e, page, Some(image_base64), started),
        }
    }

    async fn complete_with_retry(
        &self,
        request: &ChatRequest,
        page: u32,
        options: &OcrOptions,
    ) -> Result<ChatCompletion, PageError> {
        let timeout = Duration::from_secs(options.request_timeout_secs.max(1));
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(timeout, self.client.complete(request)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(InferenceError::Timeout {
                    secs: options.request_timeout_secs,
                }),
            };

            let err = match outcome {
                Ok(completion) => return Ok(completion),
                Err(e) => e,
            };

            if err.is_transient() && attempt <= options.max_retries {
                let backoff = backoff_ms(options.retry_backoff_ms, attempt);
                warn!(
                    "Page {}: attempt {} failed ({}); retrying in {}ms",
                    page, attempt, err, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
                continue;
            }

            return Err(match err {
                InferenceError::Timeout { .. } => PageError::Timeout {
                    page,
                    secs: options.request_timeout_secs,
                },
                other => PageError::RequestFailed {
                    page,
                    attempts: attempt,
                    detail: other.to_string(),
                },
            });
        }
    }
}

/// Delay before retry number `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 1u64 << attempt.saturating_sub(1).min(20);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

fn page_failure(
    error: &PageError,
    page: u32,
    image_base64: Option<String>,
    started: Instant,
) -> OcrPageResult {
    warn!("{}", error);
    OcrPageResult::failed(error, page, image_base64)
        .with_duration_ms(started.elapsed().as_millis() as u64)
}

/// Run one job with a fresh [`Orchestrator`].
pub async fn run_job(
    client: Arc<dyn InferenceClient>,
    renderer: Arc<dyn PageRenderer>,
    document: Option<&Document>,
    options: &OcrOptions,
    progress: Option<ProgressCallback>,
) -> OcrResult {
    Orchestrator::new(client, renderer)
        .run(document, options, progress)
        .await
}

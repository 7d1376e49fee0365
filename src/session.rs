//! One user's working session: the loaded document, its page selection,
//! the job options, and at most one OCR job in flight.
//!
//! ## Superseding jobs
//!
//! Every [`OcrSession::submit`] bumps a generation counter, aborts the
//! previous job's task, and spawns a new one tagged with the new generation.
//! A job only writes to the shared [`JobState`] while its tag still equals
//! the counter, and the check happens under the watch channel's lock, so a
//! response from a superseded job can never overwrite a newer job's state.
//!
//! Aborting drops the in-flight HTTP request at its next await point. A
//! render already running on the blocking pool finishes, but its output is
//! discarded with the task.

use crate::config::OcrOptions;
use crate::error::OcrError;
use crate::orchestrator::Orchestrator;
use crate::output::OcrResult;
use crate::pages::{QuickSelect, Selection};
use crate::pipeline::input::Document;
use crate::progress::{OcrProgressCallback, ProgressCallback};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Where the session's current job stands.
///
/// Every non-idle state carries the id returned by [`OcrSession::submit`].
#[derive(Debug, Clone, Default)]
pub enum JobState {
    #[default]
    Idle,
    Submitting {
        job: u64,
    },
    Processing {
        job: u64,
        /// Page currently being processed.
        page: u32,
        /// Pages finished so far, successful or not.
        completed: usize,
        total: usize,
    },
    Aggregating {
        job: u64,
    },
    Complete {
        job: u64,
        result: Arc<OcrResult>,
    },
}

impl JobState {
    pub fn job(&self) -> Option<u64> {
        match self {
            JobState::Idle => None,
            JobState::Submitting { job }
            | JobState::Processing { job, .. }
            | JobState::Aggregating { job }
            | JobState::Complete { job, .. } => Some(*job),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            JobState::Submitting { .. } | JobState::Processing { .. } | JobState::Aggregating { .. }
        )
    }

    pub fn result(&self) -> Option<&Arc<OcrResult>> {
        match self {
            JobState::Complete { result, .. } => Some(result),
            _ => None,
        }
    }
}

/// Publishes `next` only if `job` is still the current generation.
fn publish(
    state: &watch::Sender<JobState>,
    generation: &AtomicU64,
    job: u64,
    next: JobState,
) -> bool {
    state.send_if_modified(|current| {
        if generation.load(Ordering::SeqCst) != job {
            return false;
        }
        *current = next;
        true
    })
}

/// Forwards orchestrator events into the session's state channel.
struct StateProgress {
    job: u64,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<JobState>>,
    completed: AtomicUsize,
}

impl OcrProgressCallback for StateProgress {
    fn on_page_start(&self, page: u32, total_pages: usize) {
        publish(
            &self.state,
            &self.generation,
            self.job,
            JobState::Processing {
                job: self.job,
                page,
                completed: self.completed.load(Ordering::SeqCst),
                total: total_pages,
            },
        );
    }

    fn on_page_complete(&self, page: u32, total_pages: usize, _text_len: usize) {
        self.page_done(page, total_pages);
    }

    fn on_page_error(&self, page: u32, total_pages: usize, _error: &str) {
        self.page_done(page, total_pages);
    }

    fn on_job_complete(&self, _total_pages: usize, _success_count: usize) {
        publish(
            &self.state,
            &self.generation,
            self.job,
            JobState::Aggregating { job: self.job },
        );
    }
}

impl StateProgress {
    fn page_done(&self, page: u32, total_pages: usize) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        publish(
            &self.state,
            &self.generation,
            self.job,
            JobState::Processing {
                job: self.job,
                page,
                completed,
                total: total_pages,
            },
        );
    }
}

/// A single user's document, selection, options, and job.
pub struct OcrSession {
    orchestrator: Orchestrator,
    document: Option<Document>,
    selection: Selection,
    options: OcrOptions,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<JobState>>,
    task: Option<JoinHandle<()>>,
}

impl OcrSession {
    pub fn new(orchestrator: Orchestrator, options: OcrOptions) -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        Self {
            orchestrator,
            document: None,
            selection: Selection::default(),
            options,
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
            task: None,
        }
    }

    // ── Document ─────────────────────────────────────────────────────────

    /// Load a new document and return its page count.
    ///
    /// The page selection is reset and any running job is cancelled; its
    /// result belonged to the previous document. On error the session keeps
    /// its previous document.
    pub async fn load_document(&mut self, document: Document) -> Result<u32, OcrError> {
        let total_pages = self.orchestrator.page_count(&document).await?;
        self.cancel();
        info!("Loaded {} ({} pages)", document.name(), total_pages);
        self.document = Some(document);
        self.selection = Selection::new(total_pages);
        self.sync_page_range();
        Ok(total_pages)
    }

    /// Unload the document, cancelling any running job.
    pub fn clear_document(&mut self) {
        self.cancel();
        self.document = None;
        self.selection = Selection::default();
        self.sync_page_range();
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    // ── Selection ────────────────────────────────────────────────────────

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn click_page(&mut self, page: u32, extend: bool) {
        self.selection.click(page, extend);
        self.sync_page_range();
    }

    pub fn select_all(&mut self) {
        self.selection.select_all();
        self.sync_page_range();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.sync_page_range();
    }

    pub fn quick_select(&mut self, preset: QuickSelect) {
        self.selection.quick_select(preset);
        self.sync_page_range();
    }

    pub fn apply_custom_range(&mut self, from: i64, to: i64) {
        self.selection.apply_custom_range(from, to);
        self.sync_page_range();
    }

    /// Replace the selection from a typed range string.
    ///
    /// A non-blank range that selects none of the document's pages is kept
    /// as typed, so the next job fails with "no valid pages" instead of
    /// running every page.
    pub fn set_page_range(&mut self, input: &str) {
        self.selection.set_range_string(input);
        self.sync_typed_range(input);
    }

    fn sync_page_range(&mut self) {
        let range = self.selection.range_string();
        self.options.page_range = (!range.is_empty()).then_some(range);
    }

    fn sync_typed_range(&mut self, input: &str) {
        self.sync_page_range();
        let typed = input.trim();
        if self.selection.pages().is_empty() && !typed.is_empty() {
            self.options.page_range = Some(typed.to_string());
        }
    }

    // ── Options ──────────────────────────────────────────────────────────

    pub fn options(&self) -> &OcrOptions {
        &self.options
    }

    /// Replace the options. Their page range, if any, becomes the selection.
    ///
    /// A running job keeps the options it was submitted with.
    pub fn set_options(&mut self, options: OcrOptions) -> Result<(), OcrError> {
        options.validate()?;
        let typed = options.page_range.clone().unwrap_or_default();
        self.selection.set_range_string(&typed);
        self.options = options;
        self.sync_typed_range(&typed);
        Ok(())
    }

    // ── Jobs ─────────────────────────────────────────────────────────────

    /// Start a job with the current document and options, superseding any
    /// job still running. Returns the new job's id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&mut self) -> u64 {
        let job = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.task.take() {
            if !previous.is_finished() {
                debug!("Job {} superseded by job {}", job - 1, job);
            }
            previous.abort();
        }
        self.state.send_replace(JobState::Submitting { job });

        let orchestrator = self.orchestrator.clone();
        let document = self.document.clone();
        let options = self.options.clone();
        let generation = Arc::clone(&self.generation);
        let state = Arc::clone(&self.state);
        let progress: ProgressCallback = Arc::new(StateProgress {
            job,
            generation: Arc::clone(&generation),
            state: Arc::clone(&state),
            completed: AtomicUsize::new(0),
        });

        self.task = Some(tokio::spawn(async move {
            let result = orchestrator
                .run(document.as_ref(), &options, Some(progress))
                .await;
            let complete = JobState::Complete {
                job,
                result: Arc::new(result),
            };
            if !publish(&state, &generation, job, complete) {
                debug!("Discarding result of stale job {}", job);
            }
        }));

        job
    }

    /// Abandon the running job, if any, and return to idle.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state.send_replace(JobState::Idle);
    }

    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Watch state changes; intermediate states may be coalesced.
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    /// Result of the most recent completed job, if it is still current.
    pub fn last_result(&self) -> Option<Arc<OcrResult>> {
        self.state.borrow().result().cloned()
    }

    /// Wait until the current job completes and return its result.
    ///
    /// Returns `None` when the session is idle or the job is cancelled
    /// while waiting. If a newer job supersedes the current one, waits for
    /// the newer job instead.
    pub async fn wait_for_completion(&self) -> Option<Arc<OcrResult>> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| !s.is_busy())
            .await
            .ok()
            .map(|s| (*s).clone())?;
        state.result().cloned()
    }
}

impl Drop for OcrSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

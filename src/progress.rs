//! Progress-callback trait for per-page OCR events.
//!
//! Pass an [`Arc<dyn OcrProgressCallback>`] to
//! [`crate::orchestrator::run_job`] to observe a job as it walks its pages.
//! The CLI drives a progress bar from it; [`crate::session::OcrSession`]
//! turns it into `Processing { page, completed, total }` state updates.
//!
//! # Example
//!
//! ```rust
//! use typhoon_ocr::OcrProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl OcrProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page: u32, total_pages: usize, text_len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("Page {page} done ({done}/{total_pages}, {text_len} bytes)");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each page.
///
/// Pages are processed one at a time, so calls never overlap within a job;
/// the trait is still `Send + Sync` because the job runs on a Tokio task.
/// All methods default to no-ops.
pub trait OcrProgressCallback: Send + Sync {
    /// Called once the target pages are known, before the first page.
    ///
    /// # Arguments
    /// * `total_pages`: number of pages that will be processed
    fn on_job_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is rendered.
    fn on_page_start(&self, page: u32, total_pages: usize) {
        let _ = (page, total_pages);
    }

    /// Called when a page produced text.
    ///
    /// # Arguments
    /// * `page`: 1-indexed page number
    /// * `total_pages`: pages in this job
    /// * `text_len`: byte length of the extracted text
    fn on_page_complete(&self, page: u32, total_pages: usize, text_len: usize) {
        let _ = (page, total_pages, text_len);
    }

    /// Called when a page failed; the job goes on.
    fn on_page_error(&self, page: u32, total_pages: usize, error: &str) {
        let _ = (page, total_pages, error);
    }

    /// Called once after every page has been attempted.
    fn on_job_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A callback that ignores every event.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// Shared callback handle as accepted by the orchestrator.
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;

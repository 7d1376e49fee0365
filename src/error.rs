//! Error types for the typhoon-ocr library.
//!
//! Three error types, one per failure scope:
//!
//! * [`OcrError`]: **Fatal**: the job or the request cannot proceed at all
//!   (no document, bad URL, corrupt PDF, endpoint not configured). Returned as
//!   `Err(OcrError)` from ingestion and configuration functions, and carried
//!   as the top-level `error` string of a failed [`crate::output::OcrResult`].
//!
//! * [`PageError`]: **Non-fatal**: a single page failed (render glitch,
//!   inference timeout, non-success status) while the rest of the job goes on.
//!   Its display string is stored in [`crate::output::OcrPageResult::error`].
//!
//! * [`InferenceError`]: what the inference client reports for one call.
//!   The orchestrator decides from [`InferenceError::is_transient`] whether a
//!   retry is worth it, then folds the final outcome into a [`PageError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the typhoon-ocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Job errors ────────────────────────────────────────────────────────
    /// A job was submitted with no document loaded.
    #[error("No file selected. Upload a PDF or image, or import one from a URL.")]
    NoDocument,

    /// The page selection does not intersect the document's pages.
    #[error("No valid pages selected (document has {total} pages)")]
    NoPagesSelected { total: usize },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The document is neither a PDF nor a supported image type.
    #[error("Unsupported file type '{name}' ({mime_type}). Allowed: .pdf, .png, .jpg, .jpeg, .webp, .gif")]
    UnsupportedFileType { name: String, mime_type: String },

    /// The URL could not be parsed.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The URL uses a scheme other than http or https.
    #[error("Unsupported URL scheme '{scheme}': only http and https are allowed")]
    UnsupportedScheme { scheme: String },

    /// The fetch could not be completed (DNS, TLS, connection reset, ...).
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The fetch exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// Upstream answered with a non-success status.
    #[error("Failed to fetch '{url}': upstream returned HTTP {status}")]
    UpstreamStatus { url: String, status: u16 },

    /// Upstream answered successfully but with no bytes.
    #[error("Downloaded file from '{url}' is empty")]
    EmptyBody { url: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF could not be opened.
    #[error("PDF '{name}' could not be opened: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Install pdfium system-wide or set PDFIUM_LIB_PATH to the directory containing it."
    )]
    PdfiumBindingFailed(String),

    // ── Inference errors ──────────────────────────────────────────────────
    /// The inference endpoint is missing its base URL or API key.
    #[error("Inference endpoint is not configured.\n{hint}")]
    ProviderNotConfigured { hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// True for errors caused by what the caller sent rather than by the
    /// server or an upstream host. The HTTP layer maps these to 4xx.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            OcrError::NoDocument
                | OcrError::NoPagesSelected { .. }
                | OcrError::FileNotFound { .. }
                | OcrError::UnsupportedFileType { .. }
                | OcrError::InvalidUrl { .. }
                | OcrError::UnsupportedScheme { .. }
                | OcrError::CorruptPdf { .. }
                | OcrError::InvalidConfig(_)
        )
    }
}

/// A non-fatal error for a single page.
///
/// The job continues with the next page; the display string lands in the
/// page's result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: u32, detail: String },

    /// Inference call failed (after retries for transient errors).
    #[error("Page {page}: inference request failed after {attempts} attempt(s): {detail}")]
    RequestFailed {
        page: u32,
        attempts: u32,
        detail: String,
    },

    /// Inference call timed out on every attempt.
    #[error("Page {page}: inference request timed out after {secs}s")]
    Timeout { page: u32, secs: u64 },
}

/// Failure of a single call to the inference endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    /// Connection-level failure: DNS, refused, reset, TLS.
    #[error("connection error: {0}")]
    Transport(String),

    /// The call did not finish within the per-call timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not an OpenAI-style chat completion.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The completion carried no choices.
    #[error("response contained no choices")]
    EmptyChoices,
}

impl InferenceError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Connection failures, timeouts, 429 and 5xx are transient. Any other
    /// status (bad request, auth) will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            InferenceError::Transport(_) | InferenceError::Timeout { .. } => true,
            InferenceError::Status { status, .. } => *status == 429 || *status >= 500,
            InferenceError::MalformedResponse(_) | InferenceError::EmptyChoices => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_error_display_names_page() {
        let e = PageError::Timeout { page: 3, secs: 120 };
        let msg = e.to_string();
        assert!(msg.contains("Page 3"), "got: {msg}");
        assert!(msg.contains("120s"), "got: {msg}");
    }

    #[test]
    fn request_failed_display() {
        let e = PageError::RequestFailed {
            page: 2,
            attempts: 1,
            detail: "endpoint returned HTTP 400: bad".into(),
        };
        assert!(e.to_string().contains("HTTP 400"));
    }

    #[test]
    fn transient_classification() {
        assert!(InferenceError::Transport("reset".into()).is_transient());
        assert!(InferenceError::Timeout { secs: 5 }.is_transient());
        assert!(InferenceError::Status { status: 429, body: String::new() }.is_transient());
        assert!(InferenceError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!InferenceError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!InferenceError::MalformedResponse("x".into()).is_transient());
        assert!(!InferenceError::EmptyChoices.is_transient());
    }

    #[test]
    fn input_errors_are_classified() {
        assert!(OcrError::NoDocument.is_input_error());
        assert!(OcrError::UnsupportedScheme { scheme: "ftp".into() }.is_input_error());
        assert!(!OcrError::EmptyBody { url: "http://x".into() }.is_input_error());
        assert!(!OcrError::Internal("boom".into()).is_input_error());
    }

    #[test]
    fn unsupported_scheme_display() {
        let e = OcrError::UnsupportedScheme { scheme: "file".into() };
        assert!(e.to_string().contains("'file'"));
    }
}

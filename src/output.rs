//! Output types: per-page results, the job aggregate, and the two views over it.
//!
//! [`OcrResult`] is also the JSON body returned by `POST /api/ocr`, so field
//! names follow the wire format (`total_tokens`, `processing_time`, ...).

use crate::config::PageSeparator;
use crate::error::{OcrError, PageError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outcome of one processed page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrPageResult {
    /// 1-indexed page number.
    pub page: u32,
    pub success: bool,
    /// Extracted text; empty when the page failed.
    #[serde(default)]
    pub text: String,
    /// The page image that was sent to the model, base64 PNG.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Tokens reported for this page (0 when the endpoint reported none).
    #[serde(default)]
    pub tokens: u64,
    /// Time spent on this page, rendering included.
    #[serde(default)]
    pub duration_ms: u64,
}

impl OcrPageResult {
    pub fn succeeded(page: u32, text: String, image_base64: Option<String>, tokens: u64) -> Self {
        Self {
            page,
            success: true,
            text,
            image_base64,
            error: None,
            tokens,
            duration_ms: 0,
        }
    }

    pub fn failed(error: &PageError, page: u32, image_base64: Option<String>) -> Self {
        Self {
            page,
            success: false,
            text: String::new(),
            image_base64,
            error: Some(error.to_string()),
            tokens: 0,
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Aggregate result of one OCR job.
///
/// `success` is `false` only when the job failed as a whole (no document,
/// nothing to process). Individual failed pages leave it `true`; inspect
/// [`failed_pages`](Self::failed_pages) for those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub success: bool,
    /// One entry per processed page, ascending page order.
    pub results: Vec<OcrPageResult>,
    pub total_tokens: u64,
    /// Wall-clock seconds for the whole job, two decimals.
    pub processing_time: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl OcrResult {
    /// A job that failed before any page was attempted.
    pub fn failure(error: &OcrError, processing_time: f64) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            total_tokens: 0,
            processing_time,
            error: Some(error.to_string()),
        }
    }

    /// Aggregate page results: sort by page, sum tokens.
    pub fn from_pages(mut results: Vec<OcrPageResult>, elapsed_secs: f64) -> Self {
        results.sort_by_key(|r| r.page);
        let total_tokens = results.iter().map(|r| r.tokens).sum();
        Self {
            success: true,
            results,
            total_tokens,
            processing_time: round_secs(elapsed_secs),
            error: None,
        }
    }

    pub fn succeeded_pages(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed_pages(&self) -> usize {
        self.results.len() - self.succeeded_pages()
    }

    pub fn page(&self, page: u32) -> Option<&OcrPageResult> {
        self.results.iter().find(|r| r.page == page)
    }

    /// Combined view: successful pages' text in page order, joined by `separator`.
    pub fn combined(&self, separator: &PageSeparator) -> String {
        let mut out = String::new();
        for (i, r) in self.results.iter().filter(|r| r.success).enumerate() {
            if i > 0 {
                out.push_str(&separator.render(r.page));
            }
            out.push_str(&r.text);
        }
        out
    }

    /// "Copy all text": every successful page's text joined by a blank line.
    pub fn copy_all_text(&self) -> String {
        self.results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// A page-by-page view positioned on the first result.
    pub fn compare_view(&self) -> CompareView<'_> {
        CompareView {
            result: self,
            index: 0,
        }
    }

    /// Write the combined text to `path` atomically (temp file + rename).
    pub fn write_combined(&self, path: &Path, separator: &PageSeparator) -> Result<(), OcrError> {
        write_atomic(path, self.combined(separator).as_bytes())
    }
}

/// Round seconds to two decimals.
pub fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

/// Write `contents` to `path` via a temp file in the same directory.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), OcrError> {
    use std::io::Write;

    let write_failed = |source: std::io::Error| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_failed)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_failed)?;
    tmp.write_all(contents).map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}

/// Source image and extracted text of one page at a time.
#[derive(Debug, Clone, Copy)]
pub struct CompareView<'a> {
    result: &'a OcrResult,
    index: usize,
}

impl<'a> CompareView<'a> {
    pub fn current(&self) -> Option<&'a OcrPageResult> {
        self.result.results.get(self.index)
    }

    /// Position within the results, 0-based.
    pub fn position(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.result.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.results.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.len()
    }

    pub fn has_prev(&self) -> bool {
        self.index > 0
    }

    /// Move forward; stays on the last page.
    pub fn next(&mut self) -> Option<&'a OcrPageResult> {
        if self.has_next() {
            self.index += 1;
        }
        self.current()
    }

    /// Move back; stays on the first page.
    pub fn prev(&mut self) -> Option<&'a OcrPageResult> {
        if self.has_prev() {
            self.index -= 1;
        }
        self.current()
    }

    /// Jump to the result for `page`, if it was processed.
    pub fn go_to_page(&mut self, page: u32) -> Option<&'a OcrPageResult> {
        let index = self.result.results.iter().position(|r| r.page == page)?;
        self.index = index;
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OcrResult {
        OcrResult::from_pages(
            vec![
                OcrPageResult::succeeded(3, "three".into(), None, 5),
                OcrPageResult::succeeded(1, "one".into(), Some("AAAA".into()), 10),
                OcrPageResult::failed(
                    &PageError::Timeout { page: 2, secs: 30 },
                    2,
                    None,
                ),
            ],
            1.23456,
        )
    }

    #[test]
    fn aggregation_sorts_and_sums() {
        let r = sample();
        assert!(r.success);
        assert_eq!(r.results.iter().map(|p| p.page).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(r.total_tokens, 15);
        assert_eq!(r.processing_time, 1.23);
        assert_eq!(r.succeeded_pages(), 2);
        assert_eq!(r.failed_pages(), 1);
        assert!(r.page(2).unwrap().error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn copy_all_skips_failed_pages() {
        assert_eq!(sample().copy_all_text(), "one\n\nthree");
    }

    #[test]
    fn combined_uses_separator() {
        let r = sample();
        assert_eq!(r.combined(&PageSeparator::None), "one\n\nthree");
        assert_eq!(
            r.combined(&PageSeparator::Comment),
            "one\n\n<!-- page 3 -->\n\nthree"
        );
    }

    #[test]
    fn compare_view_navigation_is_bounded() {
        let r = sample();
        let mut view = r.compare_view();
        assert_eq!(view.current().unwrap().page, 1);
        assert!(!view.has_prev());
        assert_eq!(view.prev().unwrap().page, 1);
        assert_eq!(view.next().unwrap().page, 2);
        assert_eq!(view.next().unwrap().page, 3);
        assert_eq!(view.next().unwrap().page, 3);
        assert_eq!(view.go_to_page(2).unwrap().page, 2);
        assert!(view.go_to_page(9).is_none());
        assert_eq!(view.position(), 1);
    }

    #[test]
    fn failure_has_no_pages() {
        let r = OcrResult::failure(&OcrError::NoDocument, 0.0);
        assert!(!r.success);
        assert!(r.results.is_empty());
        assert!(r.error.unwrap().contains("No file selected"));
    }

    #[test]
    fn json_shape() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["results"][0]["image_base64"], "AAAA");
        assert!(v["results"][1].get("image_base64").is_none());
        assert!(v["results"][1]["error"].is_string());
        assert!(v["error"].is_null());
        assert_eq!(v["total_tokens"], 15);
    }

    #[test]
    fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("doc.md");
        sample()
            .write_combined(&path, &PageSeparator::HorizontalRule)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "one\n\n---\n\nthree"
        );
    }
}

//! Document ingestion: turn a local path or a remote URL into a [`Document`].
//!
//! Remote files are fetched in one of two ways:
//!
//! * [`fetch_remote`] performs the upstream GET itself. The HTTP relay
//!   endpoint calls this on behalf of browser clients that cannot fetch
//!   cross-origin, and the CLI calls it directly.
//! * [`fetch_via_relay`] asks a relay endpoint to do the fetch and rebuilds
//!   the document from the relay's response headers.
//!
//! Both make exactly one request with no caching and no retry; a failed
//! fetch is reported to the caller immediately.

use crate::error::OcrError;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE, USER_AGENT};
use reqwest::Url;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Header the relay uses to pass the effective filename back to its caller.
pub const FILENAME_HEADER: &str = "x-filename";

/// Name used when neither the response nor the URL provides one.
pub const DEFAULT_FILENAME: &str = "document.pdf";

const RELAY_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; typhoon-ocr/",
    env!("CARGO_PKG_VERSION"),
    "; document relay)"
);

const RELAY_ACCEPT: &str =
    "application/pdf,image/*;q=0.9,application/octet-stream;q=0.8,*/*;q=0.5";

/// Content types that say nothing about the payload.
const GENERIC_CONTENT_TYPES: &[&str] = &[
    "application/octet-stream",
    "binary/octet-stream",
    "application/binary",
    "application/force-download",
    "application/x-download",
    "application/unknown",
];

/// What kind of document a [`Document`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
}

/// A loaded document: name, MIME type, and raw bytes.
///
/// The bytes are shared, so cloning a `Document` into a job or a blocking
/// render task is cheap. Nothing outlives the job that holds it.
#[derive(Clone)]
pub struct Document {
    name: String,
    mime_type: String,
    kind: DocumentKind,
    bytes: Arc<[u8]>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("kind", &self.kind)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Document {
    /// Build a document from raw bytes.
    ///
    /// `mime_type` is trusted unless it is missing or generic, in which case
    /// the extension of `name` decides. A payload starting with `%PDF` is
    /// always treated as a PDF.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: Option<&str>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Result<Self, OcrError> {
        let name = name.into();
        let bytes: Arc<[u8]> = bytes.into();
        let mut mime_type = infer_mime_type(mime_type, &name);

        if bytes.starts_with(b"%PDF") {
            mime_type = "application/pdf".to_string();
        }

        let kind = match mime_type.as_str() {
            "application/pdf" => DocumentKind::Pdf,
            "image/png" | "image/jpeg" | "image/webp" | "image/gif" => DocumentKind::Image,
            _ => {
                return Err(OcrError::UnsupportedFileType {
                    name,
                    mime_type,
                })
            }
        };

        Ok(Self {
            name,
            mime_type,
            kind,
            bytes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == DocumentKind::Pdf
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The shared byte buffer; clones of a document point at the same one.
    pub(crate) fn shared_bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A file fetched from an upstream host, before type validation.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl RemoteFile {
    pub fn into_document(self) -> Result<Document, OcrError> {
        Document::from_bytes(self.filename, Some(&self.mime_type), self.bytes)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a CLI-style input (path or URL) to a document.
///
/// URLs go through `relay` when one is given, otherwise they are fetched
/// directly.
pub async fn resolve_input(
    input: &str,
    relay: Option<&str>,
    timeout_secs: u64,
) -> Result<Document, OcrError> {
    if is_url(input) {
        match relay {
            Some(relay_url) => fetch_via_relay(relay_url, input, timeout_secs).await,
            None => fetch_remote(input, timeout_secs).await?.into_document(),
        }
    } else {
        load_local(input).await
    }
}

/// Read a local file into a document.
pub async fn load_local(path: impl AsRef<Path>) -> Result<Document, OcrError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => OcrError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    debug!("Loaded local file: {} ({} bytes)", path.display(), bytes.len());
    Document::from_bytes(name, None, bytes)
}

/// Parse `url` and reject anything that is not http or https.
pub fn validate_url(url: &str) -> Result<Url, OcrError> {
    let parsed = Url::parse(url.trim()).map_err(|e| OcrError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(OcrError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

/// Fetch `url` from its upstream host.
///
/// Sends a descriptive user-agent and an accept header favouring documents,
/// follows redirects, and fails on a non-success status or an empty body.
pub async fn fetch_remote(url: &str, timeout_secs: u64) -> Result<RemoteFile, OcrError> {
    let parsed = validate_url(url)?;
    info!("Fetching document from: {}", parsed);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| OcrError::Internal(format!("Failed to build HTTP client: {e}")))?;

    let response = client
        .get(parsed.clone())
        .header(USER_AGENT, RELAY_USER_AGENT)
        .header(ACCEPT, RELAY_ACCEPT)
        .send()
        .await
        .map_err(|e| download_error(url, timeout_secs, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(OcrError::UpstreamStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    // The final URL after redirects names the file more reliably.
    let final_url = response.url().clone();
    let headers = response.headers().clone();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_error(url, timeout_secs, e))?;

    if bytes.is_empty() {
        return Err(OcrError::EmptyBody {
            url: url.to_string(),
        });
    }

    let filename = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition)
        .unwrap_or_else(|| filename_from_url(&final_url));

    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let mime_type = infer_mime_type(content_type, &filename);

    info!(
        "Fetched {} ({} bytes, {})",
        filename,
        bytes.len(),
        mime_type
    );

    Ok(RemoteFile {
        filename,
        mime_type,
        bytes: bytes.to_vec(),
    })
}

/// Fetch `url` through the relay endpoint at `relay_url`.
pub async fn fetch_via_relay(
    relay_url: &str,
    url: &str,
    timeout_secs: u64,
) -> Result<Document, OcrError> {
    validate_url(url)?;
    info!("Fetching {} via relay {}", url, relay_url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrError::Internal(format!("Failed to build HTTP client: {e}")))?;

    let response = client
        .post(relay_url)
        .json(&serde_json::json!({ "url": url }))
        .send()
        .await
        .map_err(|e| download_error(url, timeout_secs, e))?;

    if !response.status().is_success() {
        let status = response.status();
        let reason = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("relay returned HTTP {status}"));
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason,
        });
    }

    let headers = response.headers().clone();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_error(url, timeout_secs, e))?;

    if bytes.is_empty() {
        return Err(OcrError::EmptyBody {
            url: url.to_string(),
        });
    }

    let filename = headers
        .get(FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| validate_url(url).ok().map(|u| filename_from_url(&u)))
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    Document::from_bytes(filename, content_type, bytes.to_vec())
}

fn download_error(url: &str, timeout_secs: u64, e: reqwest::Error) -> OcrError {
    if e.is_timeout() {
        OcrError::DownloadTimeout {
            url: url.to_string(),
            secs: timeout_secs,
        }
    } else {
        OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Last non-empty path segment of `url`, or [`DEFAULT_FILENAME`].
pub fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|last| !last.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

static RE_DISPOSITION_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'[^']*')?"?([^";]+)"?"#).unwrap()
});

/// Filename from a `Content-Disposition` header value, if it carries one.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    RE_DISPOSITION_FILENAME
        .captures(value)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Pick a MIME type from a content-type header, falling back to the
/// filename's extension when the header is absent or generic.
pub fn infer_mime_type(content_type: Option<&str>, filename: &str) -> String {
    let declared = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && !GENERIC_CONTENT_TYPES.contains(&ct.as_str()));

    if let Some(ct) = declared {
        return match ct.as_str() {
            "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
            "application/x-pdf" => "application/pdf".to_string(),
            _ => ct,
        };
    }

    mime_from_extension(filename).to_string()
}

/// MIME type for a filename's extension; `application/octet-stream` if unknown.
pub fn mime_from_extension(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn validate_url_rejects_other_schemes() {
        assert!(validate_url("https://example.com/a.pdf").is_ok());
        assert!(matches!(
            validate_url("ftp://example.com/a.pdf"),
            Err(OcrError::UnsupportedScheme { scheme }) if scheme == "ftp"
        ));
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(OcrError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(OcrError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn mime_prefers_specific_content_type() {
        assert_eq!(infer_mime_type(Some("application/pdf"), "x.bin"), "application/pdf");
        assert_eq!(
            infer_mime_type(Some("image/PNG; charset=binary"), "x"),
            "image/png"
        );
        assert_eq!(infer_mime_type(Some("image/jpg"), "x"), "image/jpeg");
    }

    #[test]
    fn mime_falls_back_to_extension() {
        assert_eq!(infer_mime_type(None, "scan.JPG"), "image/jpeg");
        assert_eq!(
            infer_mime_type(Some("application/octet-stream"), "paper.pdf"),
            "application/pdf"
        );
        assert_eq!(infer_mime_type(Some(""), "photo.webp"), "image/webp");
        assert_eq!(infer_mime_type(None, "notes.txt"), "application/octet-stream");
    }

    #[test]
    fn filename_from_url_path() {
        let url = Url::parse("https://example.com/files/report.pdf?dl=1").unwrap();
        assert_eq!(filename_from_url(&url), "report.pdf");
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(filename_from_url(&url), DEFAULT_FILENAME);
    }

    #[test]
    fn filename_from_content_disposition() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="scan 01.pdf""#).as_deref(),
            Some("scan 01.pdf")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename*=UTF-8''report.pdf").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn document_detects_pdf_by_magic() {
        let doc = Document::from_bytes("blob", None, b"%PDF-1.7\n...".to_vec()).unwrap();
        assert!(doc.is_pdf());
        assert_eq!(doc.mime_type(), "application/pdf");
    }

    #[test]
    fn document_rejects_unsupported_types() {
        let err = Document::from_bytes("notes.txt", None, b"hello".to_vec()).unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFileType { .. }));
    }

    #[test]
    fn document_accepts_images_by_extension() {
        let doc = Document::from_bytes("scan.png", None, vec![0x89, b'P', b'N', b'G']).unwrap();
        assert_eq!(doc.kind(), DocumentKind::Image);
        assert_eq!(doc.len(), 4);
    }

    #[tokio::test]
    async fn load_local_missing_file() {
        let err = load_local("/definitely/not/here.pdf").await.unwrap_err();
        assert!(matches!(err, OcrError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn load_local_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.pdf");
        std::fs::write(&path, b"%PDF-1.4 test").unwrap();
        let doc = load_local(&path).await.unwrap();
        assert_eq!(doc.name(), "page.pdf");
        assert!(doc.is_pdf());
    }

    #[tokio::test]
    async fn fetch_remote_rejects_bad_scheme_before_network() {
        let err = fetch_remote("ftp://example.com/a.pdf", 5).await.unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedScheme { .. }));
    }
}

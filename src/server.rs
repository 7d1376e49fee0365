//! HTTP surface: document relay, OCR, page count, model list, health.
//!
//! | Method | Path              | Body                      | Response |
//! |--------|-------------------|---------------------------|----------|
//! | POST   | `/api/proxy-pdf`  | `{"url": "..."}`          | raw bytes + `Content-Type`, `Content-Length`, `X-Filename` |
//! | POST   | `/api/ocr`        | multipart `file` + fields | [`OcrResult`] JSON |
//! | POST   | `/api/page-count` | multipart `file`          | `{"page_count", "is_pdf"}` |
//! | GET    | `/api/models`     |                           | `[{"id", "name", "description"}]` |
//! | GET    | `/health`         |                           | `{"status", "service", "version"}` |
//!
//! Errors are `{"error": <message>, "code": <CODE>}` with a matching status.
//! Each request to the server is stateless: an OCR request runs one job to
//! completion and keeps nothing afterwards.

use crate::config::{OcrOptions, TaskType, DEFAULT_MODEL};
use crate::error::OcrError;
use crate::orchestrator::Orchestrator;
use crate::output::OcrResult;
use crate::pipeline::input::{self, Document, DEFAULT_FILENAME, FILENAME_HEADER};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Listener and limits for [`run_server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Timeout for the relay's upstream fetch.
    pub relay_timeout_secs: u64,
    /// Largest accepted upload.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            relay_timeout_secs: 60,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

/// An entry of `GET /api/models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl ModelInfo {
    fn from_id(id: String) -> Self {
        if id == DEFAULT_MODEL {
            Self {
                id,
                name: "Typhoon OCR".to_string(),
                description: "Default OCR model for document processing".to_string(),
            }
        } else {
            Self {
                name: id.clone(),
                description: "OCR model served by the configured endpoint".to_string(),
                id,
            }
        }
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Orchestrator,
    defaults: Arc<OcrOptions>,
    models: Arc<Vec<ModelInfo>>,
    relay_timeout_secs: u64,
}

impl AppState {
    /// `defaults` seeds every OCR request; form fields override them.
    pub fn new(orchestrator: Orchestrator, defaults: OcrOptions, relay_timeout_secs: u64) -> Self {
        let mut ids = orchestrator.client().models();
        if ids.is_empty() {
            ids.push(defaults.model.clone());
        }
        let models = ids.into_iter().map(ModelInfo::from_id).collect();
        Self {
            orchestrator,
            defaults: Arc::new(defaults),
            models: Arc::new(models),
            relay_timeout_secs,
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

/// An error rendered as `{"error", "code"}` JSON.
#[derive(Debug)]
pub enum ApiError {
    Ocr(OcrError),
    BadRequest(String),
}

impl From<OcrError> for ApiError {
    fn from(e: OcrError) -> Self {
        ApiError::Ocr(e)
    }
}

/// Stable machine-readable code for an error.
pub fn error_code(e: &OcrError) -> &'static str {
    match e {
        OcrError::NoDocument => "NO_DOCUMENT",
        OcrError::NoPagesSelected { .. } => "NO_PAGES_SELECTED",
        OcrError::FileNotFound { .. } => "FILE_NOT_FOUND",
        OcrError::PermissionDenied { .. } => "PERMISSION_DENIED",
        OcrError::UnsupportedFileType { .. } => "UNSUPPORTED_FILE_TYPE",
        OcrError::InvalidUrl { .. } => "INVALID_URL",
        OcrError::UnsupportedScheme { .. } => "UNSUPPORTED_SCHEME",
        OcrError::DownloadFailed { .. } => "DOWNLOAD_FAILED",
        OcrError::DownloadTimeout { .. } => "DOWNLOAD_TIMEOUT",
        OcrError::UpstreamStatus { .. } => "UPSTREAM_STATUS",
        OcrError::EmptyBody { .. } => "EMPTY_BODY",
        OcrError::CorruptPdf { .. } => "CORRUPT_PDF",
        OcrError::PdfiumBindingFailed(_) => "PDFIUM_UNAVAILABLE",
        OcrError::ProviderNotConfigured { .. } => "PROVIDER_NOT_CONFIGURED",
        OcrError::OutputWriteFailed { .. } => "OUTPUT_WRITE_FAILED",
        OcrError::InvalidConfig(_) => "INVALID_CONFIG",
        OcrError::Internal(_) => "INTERNAL_ERROR",
    }
}

/// HTTP status for an error.
pub fn error_status(e: &OcrError) -> StatusCode {
    match e {
        _ if e.is_input_error() => StatusCode::BAD_REQUEST,
        OcrError::UpstreamStatus { .. }
        | OcrError::DownloadFailed { .. }
        | OcrError::EmptyBody { .. } => StatusCode::BAD_GATEWAY,
        OcrError::DownloadTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        OcrError::ProviderNotConfigured { .. } | OcrError::PdfiumBindingFailed(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Ocr(e) => (error_status(e), error_code(e), e.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };
        if status.is_server_error() {
            error!(code, "{}", message);
        } else {
            debug!(code, "{}", message);
        }
        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

// ── Router ───────────────────────────────────────────────────────────────

/// Build the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(FILENAME_HEADER)]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/models", get(models_handler))
        .route("/api/proxy-pdf", post(proxy_handler))
        .route("/api/ocr", post(ocr_handler))
        .route("/api/page-count", post(page_count_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM.
pub async fn run_server(config: ServerConfig, state: AppState) -> Result<(), OcrError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| OcrError::InvalidConfig(format!("invalid listen address: {e}")))?;

    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| OcrError::Internal(format!("failed to bind {addr}: {e}")))?;

    info!("Server listening on http://{}", addr);
    info!("  POST /api/proxy-pdf  - fetch a document by URL");
    info!("  POST /api/ocr        - OCR an uploaded document");
    info!("  POST /api/page-count - count pages of an upload");
    info!("  GET  /api/models     - list models");
    info!("  GET  /health         - health check");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| OcrError::Internal(format!("server error: {e}")))?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "typhoon-ocr",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn models_handler(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
    Json(state.models.as_ref().clone())
}

#[derive(Deserialize)]
struct ProxyRequest {
    #[serde(default)]
    url: Option<String>,
}

/// POST /api/proxy-pdf
async fn proxy_handler(
    State(state): State<AppState>,
    body: Result<Json<ProxyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?;
    let url = request
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("URL is required".to_string()))?;

    let file = input::fetch_remote(&url, state.relay_timeout_secs).await?;

    let content_type = HeaderValue::from_str(&file.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let filename = HeaderValue::from_str(&file.filename)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_FILENAME));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(file.bytes.len())),
            (HeaderName::from_static(FILENAME_HEADER), filename),
        ],
        file.bytes,
    )
        .into_response())
}

/// An uploaded multipart `file` field.
struct Upload {
    filename: String,
    content_type: Option<String>,
    bytes: Bytes,
}

impl Upload {
    fn into_document(self) -> Result<Document, OcrError> {
        if self.bytes.is_empty() {
            return Err(OcrError::NoDocument);
        }
        Document::from_bytes(self.filename, self.content_type.as_deref(), self.bytes.to_vec())
    }
}

/// Multipart body of `/api/ocr` and `/api/page-count`.
#[derive(Default)]
struct OcrForm {
    file: Option<Upload>,
    fields: Vec<(String, String)>,
}

impl OcrForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = OcrForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name == "file" {
                let filename = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(DEFAULT_FILENAME)
                    .to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
                debug!("Received file '{}' ({} bytes)", filename, bytes.len());
                form.file = Some(Upload {
                    filename,
                    content_type,
                    bytes,
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read field '{name}': {e}")))?;
                form.fields.push((name, value));
            }
        }
        Ok(form)
    }

    fn document(&mut self) -> Result<Document, ApiError> {
        let upload = self.file.take().ok_or(OcrError::NoDocument)?;
        Ok(upload.into_document()?)
    }

    /// Apply the form fields on top of `defaults`.
    fn options(&self, defaults: &OcrOptions) -> Result<OcrOptions, OcrError> {
        let mut builder = defaults.to_builder();
        for (name, value) in &self.fields {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            builder = match name.as_str() {
                "model" => builder.model(value),
                "task_type" => builder.task_type(value.parse::<TaskType>()?),
                "max_tokens" => builder.max_tokens(parse_field(name, value)?),
                "temperature" => builder.temperature(parse_field(name, value)?),
                "top_p" => builder.top_p(parse_field(name, value)?),
                "repetition_penalty" => builder.repetition_penalty(parse_field(name, value)?),
                "pages" | "page_range" => builder.page_range(value),
                other => {
                    debug!("Ignoring unknown form field '{}'", other);
                    builder
                }
            };
        }
        builder.build()
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, OcrError> {
    value
        .parse()
        .map_err(|_| OcrError::InvalidConfig(format!("invalid value for {name}: '{value}'")))
}

/// POST /api/ocr
async fn ocr_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OcrResult>, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("ocr_request", request_id = %request_id);
    run_ocr_request(state, multipart).instrument(span).await
}

async fn run_ocr_request(
    state: AppState,
    multipart: Multipart,
) -> Result<Json<OcrResult>, ApiError> {
    let mut form = OcrForm::read(multipart).await?;
    let document = form.document()?;
    let options = form.options(&state.defaults)?;
    info!(
        file = %document.name(),
        bytes = document.len(),
        task = %options.task_type,
        pages = options.page_range.as_deref().unwrap_or("all"),
        "Processing OCR request"
    );

    let result = state.orchestrator.run(Some(&document), &options, None).await;
    info!(
        success = result.success,
        pages = result.results.len(),
        tokens = result.total_tokens,
        seconds = result.processing_time,
        "OCR request finished"
    );
    Ok(Json(result))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageCountResponse {
    pub page_count: u32,
    pub is_pdf: bool,
}

/// POST /api/page-count
async fn page_count_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PageCountResponse>, ApiError> {
    let mut form = OcrForm::read(multipart).await?;
    let document = form.document()?;
    if !document.is_pdf() {
        return Ok(Json(PageCountResponse {
            page_count: 1,
            is_pdf: false,
        }));
    }
    let page_count = state.orchestrator.page_count(&document).await?;
    Ok(Json(PageCountResponse {
        page_count,
        is_pdf: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_scope() {
        assert_eq!(error_status(&OcrError::NoDocument), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_status(&OcrError::UnsupportedScheme { scheme: "ftp".into() }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&OcrError::UpstreamStatus {
                url: "http://x".into(),
                status: 404
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&OcrError::DownloadTimeout {
                url: "http://x".into(),
                secs: 5
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            error_status(&OcrError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn form_fields_override_defaults() {
        let form = OcrForm {
            file: None,
            fields: vec![
                ("task_type".into(), "structure".into()),
                ("temperature".into(), "0.3".into()),
                ("max_tokens".into(), "2048".into()),
                ("pages".into(), "1-2, x, 4".into()),
                ("top_p".into(), "".into()),
            ],
        };
        let o = form.options(&OcrOptions::default()).unwrap();
        assert_eq!(o.task_type, TaskType::Structure);
        assert!((o.temperature - 0.3).abs() < 1e-6);
        assert_eq!(o.max_tokens, 2048);
        assert_eq!(o.top_p, 0.6);
        assert_eq!(o.page_set().iter().collect::<Vec<_>>(), vec![1, 2, 4]);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let form = OcrForm {
            file: None,
            fields: vec![("max_tokens".into(), "lots".into())],
        };
        let err = form.options(&OcrOptions::default()).unwrap_err();
        assert_eq!(error_code(&err), "INVALID_CONFIG");
    }

    #[test]
    fn model_info_names_default_model() {
        assert_eq!(ModelInfo::from_id("typhoon-ocr".into()).name, "Typhoon OCR");
        assert_eq!(ModelInfo::from_id("other".into()).name, "other");
    }
}

//! Page rendering: turn one page of a [`Document`] into a raster image.
//!
//! PDFs are rasterised with pdfium; image documents are a single page that
//! is decoded and, if needed, downscaled. Both paths cap the longest edge at
//! the job's `image_dim`, which keeps request bodies well under typical
//! upload limits while leaving text legible to the model.
//!
//! PDF pages also yield a [`PageLayout`]: every text segment and image
//! object with its position, for the prompt's anchor text.
//!
//! ## Why synchronous?
//!
//! pdfium is a C++ library with thread-local state and is not async-safe.
//! [`PageRenderer`] is therefore a plain blocking trait; the orchestrator
//! calls it through `tokio::task::spawn_blocking` so rendering never stalls
//! the runtime's worker threads.
//!
//! The library is bound once per process. [`DocumentRenderer`] keeps the
//! most recently loaded PDF, so a job's page count and its page renders
//! parse the document once.

use crate::error::{OcrError, PageError};
use crate::pipeline::input::{Document, DocumentKind};
use crate::pipeline::layout::{BoundingBox, PageLayout, TextElement};
use image::imageops::FilterType;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Environment variable pointing at a pdfium library file or its directory.
pub const ENV_PDFIUM_LIB_PATH: &str = "PDFIUM_LIB_PATH";

static PDFIUM: OnceCell<Pdfium> = OnceCell::new();

/// One rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-indexed page number.
    pub page: u32,
    pub image: DynamicImage,
    /// Page width as reported to the model (points for PDFs, pixels for images).
    pub width: f32,
    pub height: f32,
    /// Positioned text and images; empty for image documents.
    pub layout: PageLayout,
}

/// Renders pages of a document.
///
/// Implementations must be `Send + Sync`: one renderer is shared by every
/// job of a session and moved into blocking tasks.
pub trait PageRenderer: Send + Sync {
    /// Number of pages in `document`. Images have exactly one.
    fn page_count(&self, document: &Document) -> Result<u32, OcrError>;

    /// Render `page` (1-indexed) with its longest edge at most `max_dim` pixels.
    fn render_page(
        &self,
        document: &Document,
        page: u32,
        max_dim: u32,
    ) -> Result<RenderedPage, PageError>;
}

struct LoadedPdf {
    source: Arc<[u8]>,
    pdf: PdfDocument<'static>,
}

/// The production renderer: pdfium for PDFs, the `image` crate for images.
#[derive(Default)]
pub struct DocumentRenderer {
    loaded: Mutex<Option<LoadedPdf>>,
}

impl fmt::Debug for DocumentRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentRenderer").finish_non_exhaustive()
    }
}

impl DocumentRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the parsed form of `document`, loading it unless it
    /// is the document already held.
    fn with_pdf<T>(
        &self,
        document: &Document,
        f: impl FnOnce(&PdfDocument<'static>) -> T,
    ) -> Result<T, OcrError> {
        let pdfium = pdfium()?;
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = match loaded.take() {
            Some(entry) if Arc::ptr_eq(&entry.source, document.shared_bytes()) => entry,
            _ => {
                let pdf = pdfium
                    .load_pdf_from_byte_vec(document.bytes().to_vec(), None)
                    .map_err(|e| OcrError::CorruptPdf {
                        name: document.name().to_string(),
                        detail: format!("{:?}", e),
                    })?;
                debug!("Loaded {} ({} bytes)", document.name(), document.len());
                LoadedPdf {
                    source: Arc::clone(document.shared_bytes()),
                    pdf,
                }
            }
        };

        let out = f(&entry.pdf);
        *loaded = Some(entry);
        Ok(out)
    }
}

impl PageRenderer for DocumentRenderer {
    fn page_count(&self, document: &Document) -> Result<u32, OcrError> {
        match document.kind() {
            DocumentKind::Image => Ok(1),
            DocumentKind::Pdf => {
                let count = self.with_pdf(document, |pdf| pdf.pages().len() as u32)?;
                debug!("{}: {} pages", document.name(), count);
                Ok(count)
            }
        }
    }

    fn render_page(
        &self,
        document: &Document,
        page: u32,
        max_dim: u32,
    ) -> Result<RenderedPage, PageError> {
        match document.kind() {
            DocumentKind::Image => render_image(document, page, max_dim),
            DocumentKind::Pdf => self
                .with_pdf(document, |pdf| render_pdf_page(pdf, page, max_dim))
                .map_err(|e| PageError::RenderFailed {
                    page,
                    detail: e.to_string(),
                })?,
        }
    }
}

fn render_image(document: &Document, page: u32, max_dim: u32) -> Result<RenderedPage, PageError> {
    if page != 1 {
        return Err(PageError::RenderFailed {
            page,
            detail: "image documents have a single page".to_string(),
        });
    }

    let image = image::load_from_memory(document.bytes()).map_err(|e| PageError::RenderFailed {
        page,
        detail: format!("image decoding failed: {e}"),
    })?;
    let image = fit_within(image, max_dim);

    debug!(
        "Decoded image {} → {}x{} px",
        document.name(),
        image.width(),
        image.height()
    );

    Ok(RenderedPage {
        page,
        width: image.width() as f32,
        height: image.height() as f32,
        image,
        layout: PageLayout::default(),
    })
}

fn render_pdf_page(
    pdf: &PdfDocument<'_>,
    page: u32,
    max_dim: u32,
) -> Result<RenderedPage, PageError> {
    let render_failed = |detail: String| PageError::RenderFailed { page, detail };

    let pages = pdf.pages();
    let total = pages.len() as u32;
    if page == 0 || page > total {
        return Err(render_failed(format!(
            "page out of range (document has {total} pages)"
        )));
    }

    let pdf_page = pages
        .get((page - 1) as u16)
        .map_err(|e| render_failed(format!("{:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_dim as i32)
        .set_maximum_height(max_dim as i32);

    let bitmap = pdf_page
        .render_with_config(&render_config)
        .map_err(|e| render_failed(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    let layout = page_layout(&pdf_page);

    debug!(
        "Rendered page {} → {}x{} px, {} text runs, {} images",
        page,
        image.width(),
        image.height(),
        layout.text.len(),
        layout.images.len()
    );

    Ok(RenderedPage {
        page,
        width: pdf_page.width().value,
        height: pdf_page.height().value,
        image,
        layout,
    })
}

/// Text segments and image objects of a page, in PDF user space.
///
/// A page whose text layer cannot be read still renders; it just has no
/// text runs.
fn page_layout(pdf_page: &PdfPage<'_>) -> PageLayout {
    let mut layout = PageLayout::default();

    if let Ok(text_page) = pdf_page.text() {
        for segment in text_page.segments().iter() {
            let text = segment.text();
            if text.trim().is_empty() {
                continue;
            }
            let bounds = segment.bounds();
            layout
                .text
                .push(TextElement::new(bounds.left().value, bounds.bottom().value, text));
        }
    }

    for object in pdf_page.objects().iter() {
        if object.object_type() != PdfPageObjectType::Image {
            continue;
        }
        if let Ok(bounds) = object.bounds() {
            layout.images.push(BoundingBox::new(
                bounds.left().value,
                bounds.bottom().value,
                bounds.right().value,
                bounds.top().value,
            ));
        }
    }

    layout
}

/// Downscale so the longest edge is at most `max_dim`; smaller images pass through.
pub fn fit_within(image: DynamicImage, max_dim: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_dim {
        return image;
    }
    image.resize(max_dim, max_dim, FilterType::Lanczos3)
}

/// The process-wide pdfium instance, bound on first use.
///
/// A failed bind is not cached; the next call tries again.
fn pdfium() -> Result<&'static Pdfium, OcrError> {
    PDFIUM.get_or_try_init(bind_pdfium)
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system.
fn bind_pdfium() -> Result<Pdfium, OcrError> {
    let bindings = match std::env::var(ENV_PDFIUM_LIB_PATH) {
        Ok(path) if !path.is_empty() => {
            let path = Path::new(&path);
            if path.is_dir() {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            } else {
                Pdfium::bind_to_library(path)
            }
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| OcrError::PdfiumBindingFailed(format!("{:?}", e)))?;

    debug!("Bound pdfium");
    Ok(Pdfium::new(bindings))
}

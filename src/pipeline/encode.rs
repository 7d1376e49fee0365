//! Image encoding: `DynamicImage` → base64 PNG for the request body.
//!
//! The same base64 string serves twice: inline in the chat request as a
//! `data:` URL, and in the page result as the preview shown next to the
//! extracted text. PNG is lossless; JPEG artefacts on rendered text hurt
//! recognition more than the extra bytes cost.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// A base64-encoded image ready to embed in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub base64: String,
    pub mime_type: &'static str,
}

impl ImagePayload {
    /// `data:image/png;base64,...`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// Encode a rendered page as base64 PNG.
///
/// Alpha is flattened to RGB first; some OpenAI-compatible servers reject
/// RGBA input, and a transparent page background reads as black to others.
pub fn encode_page(img: &DynamicImage) -> Result<ImagePayload, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImagePayload {
        base64: b64,
        mime_type: "image/png",
    })
}

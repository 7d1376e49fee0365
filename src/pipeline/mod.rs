//! Pipeline stages for page-by-page OCR.
//!
//! Each submodule implements exactly one transformation step so each can be
//! tested on its own and swapped (fake renderer, fake endpoint) in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ inference ──▶ response
//! (bytes)   (pdfium)   (base64)   (chat API)    (natural_text)
//! ```
//!
//! 1. [`input`]: load a local file or fetch a URL (directly or via a relay)
//!    into a typed [`input::Document`]
//! 2. [`render`]: rasterise one page and collect its [`layout`] (text runs
//!    and image regions); blocking, called via `spawn_blocking`
//! 3. [`encode`]: PNG-encode and base64-wrap the page image
//! 4. [`inference`]: one chat-completion call; the only stage that talks to
//!    the model
//! 5. [`response`]: pull `natural_text` out of the answer, or keep it raw

pub mod encode;
pub mod inference;
pub mod input;
pub mod layout;
pub mod render;
pub mod response;

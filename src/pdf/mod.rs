//! PDF page copying and stamping.
//!
//! Signing needs three primitives from a PDF engine: copy every page into a
//! fresh document, draw an image at a rectangle, and serialize. They sit
//! behind [`PdfEngine`]; [`LopdfEngine`] is the built-in implementation and
//! [`UnavailableEngine`] models an engine that cannot be used.

mod engine;
mod lopdf_engine;

pub use engine::{PageBox, PdfEngine, StampImage, UnavailableEngine, DEFAULT_MEDIA_BOX};
pub use lopdf_engine::LopdfEngine;

/// PDF magic header.
pub const PDF_HEADER: &[u8] = b"%PDF-";

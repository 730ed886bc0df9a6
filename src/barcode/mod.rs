//! QR verification codes.
//!
//! A [`QrPayload`] (document id, recorded hash, signature reference,
//! timestamp) is serialized as JSON and rendered as a PNG QR code. Two
//! variants exist: a plain code at the configured error correction level
//! (medium by default), and a high-correction code with a short text label
//! over its centre.
//!
//! ## Example
//!
//! ```ignore
//! use pdf_seal::barcode::{QrCodec, QrCodeOptions, QrPayload};
//!
//! let codec = QrCodec::new(QrCodeOptions::default().size(256));
//! let payload = QrPayload::for_signature(document_id, &record);
//! let png = codec.generate_qr_code_with_label(&payload, "Registrar")?;
//! ```

mod glyphs;
mod payload;
mod qr;

pub use payload::QrPayload;
pub use qr::{QrCodeOptions, QrCodec, QrErrorCorrection, MAX_LABEL_COVERAGE_PERCENT};

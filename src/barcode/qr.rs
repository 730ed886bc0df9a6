//! QR code rendering to PNG.

use image::{DynamicImage, Rgba, RgbaImage};
use qrcode::{EcLevel, QrCode};

use super::glyphs::{self, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use super::payload::QrPayload;
use crate::error::{Error, Result};

/// Largest share of the symbol a centre label may cover, in percent.
///
/// High error correction recovers roughly 30% of damaged modules; the label
/// stays well inside that.
pub const MAX_LABEL_COVERAGE_PERCENT: u32 = 9;

/// Label box padding in glyph pixels.
const LABEL_PADDING: u32 = 2;

/// QR code error correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrErrorCorrection {
    /// Low (~7% correction capability)
    Low,
    /// Medium (~15% correction capability)
    #[default]
    Medium,
    /// Quartile (~25% correction capability)
    Quartile,
    /// High (~30% correction capability)
    High,
}

impl QrErrorCorrection {
    fn ec_level(self) -> EcLevel {
        match self {
            QrErrorCorrection::Low => EcLevel::L,
            QrErrorCorrection::Medium => EcLevel::M,
            QrErrorCorrection::Quartile => EcLevel::Q,
            QrErrorCorrection::High => EcLevel::H,
        }
    }
}

/// Options for QR code generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCodeOptions {
    /// Size of the QR code in pixels (width = height)
    pub size: u32,
    /// Error correction level for unlabelled codes
    pub error_correction: QrErrorCorrection,
    /// Quiet zone (border) in modules
    pub quiet_zone: u32,
    /// Foreground color (RGBA)
    pub foreground: [u8; 4],
    /// Background color (RGBA)
    pub background: [u8; 4],
}

impl Default for QrCodeOptions {
    fn default() -> Self {
        Self {
            size: 200,
            error_correction: QrErrorCorrection::Medium,
            quiet_zone: 4,
            foreground: [0, 0, 0, 255],
            background: [255, 255, 255, 255],
        }
    }
}

impl QrCodeOptions {
    /// Create new QR code options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size in pixels.
    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Set the error correction level.
    pub fn error_correction(mut self, level: QrErrorCorrection) -> Self {
        self.error_correction = level;
        self
    }

    /// Set the quiet zone (border) in modules.
    pub fn quiet_zone(mut self, modules: u32) -> Self {
        self.quiet_zone = modules;
        self
    }

    /// Set the foreground color (RGBA).
    pub fn foreground(mut self, r: u8, g: u8, b: u8, a: u8) -> Self {
        self.foreground = [r, g, b, a];
        self
    }

    /// Set the background color (RGBA).
    pub fn background(mut self, r: u8, g: u8, b: u8, a: u8) -> Self {
        self.background = [r, g, b, a];
        self
    }
}

/// Encodes verification payloads as QR code PNG images.
#[derive(Debug, Clone, Default)]
pub struct QrCodec {
    options: QrCodeOptions,
}

impl QrCodec {
    /// Create a codec with the given rendering options.
    pub fn new(options: QrCodeOptions) -> Self {
        Self { options }
    }

    /// Rendering options.
    pub fn options(&self) -> &QrCodeOptions {
        &self.options
    }

    /// Encode `payload` as a PNG at the configured error correction level.
    pub fn generate_qr_code(&self, payload: &QrPayload) -> Result<Vec<u8>> {
        let json = payload.to_json()?;
        let img = self.render(&json, self.options.error_correction)?;
        log::debug!(
            "Rendered QR code for document {} ({} bytes of payload)",
            payload.document_id,
            json.len()
        );
        encode_png(img)
    }

    /// Encode `payload` at high error correction with a short text label
    /// drawn over the centre of the symbol.
    ///
    /// The label box never covers more than
    /// [`MAX_LABEL_COVERAGE_PERCENT`] of the symbol; text that does not fit
    /// is truncated. An empty label yields a plain high-correction code.
    pub fn generate_qr_code_with_label(&self, payload: &QrPayload, label: &str) -> Result<Vec<u8>> {
        let json = payload.to_json()?;
        let (mut img, symbol) = self.render_symbol(&json, QrErrorCorrection::High)?;
        draw_label(&mut img, label, symbol, &self.options);
        encode_png(img)
    }

    /// Render `data` as an RGBA image of exactly `options.size` pixels.
    ///
    /// Every module is the same whole number of pixels wide; the symbol is
    /// centred on a background canvas and any leftover pixels widen the
    /// margin. Fails if the canvas is smaller than one pixel per module.
    pub fn render(&self, data: &str, level: QrErrorCorrection) -> Result<RgbaImage> {
        self.render_symbol(data, level).map(|(img, _)| img)
    }

    fn render_symbol(&self, data: &str, level: QrErrorCorrection) -> Result<(RgbaImage, Symbol)> {
        let options = &self.options;
        if options.size == 0 {
            return Err(Error::Barcode("QR code size must be positive".to_string()));
        }

        let code = QrCode::with_error_correction_level(data, level.ec_level())
            .map_err(|e| Error::Barcode(format!("QR code encoding error: {}", e)))?;

        let qr_width = code.width() as u32;
        let module_count = qr_width + options.quiet_zone * 2;
        let module_size = options.size / module_count;
        if module_size == 0 {
            return Err(Error::Barcode(format!(
                "QR code needs at least {}px, got {}px",
                module_count, options.size
            )));
        }

        let margin = (options.size - module_count * module_size) / 2;
        let symbol = Symbol {
            origin: margin + options.quiet_zone * module_size,
            extent: qr_width * module_size,
        };

        let mut img = RgbaImage::from_pixel(options.size, options.size, Rgba(options.background));
        let fg = Rgba(options.foreground);
        for (y, row) in code.to_colors().chunks(qr_width as usize).enumerate() {
            for (x, &module) in row.iter().enumerate() {
                if module != qrcode::Color::Dark {
                    continue;
                }
                let start_x = symbol.origin + x as u32 * module_size;
                let start_y = symbol.origin + y as u32 * module_size;
                for py in start_y..start_y + module_size {
                    for px in start_x..start_x + module_size {
                        img.put_pixel(px, py, fg);
                    }
                }
            }
        }

        Ok((img, symbol))
    }
}

/// Placement of the symbol's modules (quiet zone excluded) on the canvas.
#[derive(Debug, Clone, Copy)]
struct Symbol {
    origin: u32,
    extent: u32,
}

/// Geometry of a centre label inside a square image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LabelLayout {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub scale: u32,
    pub max_chars: usize,
}

/// Lay out a label box for an image of `size` pixels.
///
/// The box is about 40% wide and 20% tall, so it covers at most 8% of the
/// image. Returns `None` when not even one glyph fits.
pub(crate) fn label_layout(size: u32) -> Option<LabelLayout> {
    let width = size * 2 / 5;
    let height = size / 5;
    if u64::from(width) * u64::from(height) * 100
        > u64::from(size) * u64::from(size) * u64::from(MAX_LABEL_COVERAGE_PERCENT)
    {
        return None;
    }

    let scale = (size / 160).max(1);
    let padding = LABEL_PADDING * scale;
    let inner_width = width.checked_sub(2 * padding)?;
    if height < GLYPH_HEIGHT * scale + 2 * padding {
        return None;
    }
    let max_chars = ((inner_width + scale) / (GLYPH_ADVANCE * scale)) as usize;
    if max_chars == 0 {
        return None;
    }

    Some(LabelLayout {
        x: (size - width) / 2,
        y: (size - height) / 2,
        width,
        height,
        scale,
        max_chars,
    })
}

/// Truncate `label` to at most `max_chars` characters.
pub(crate) fn fit_label(label: &str, max_chars: usize) -> String {
    label.trim().chars().take(max_chars).collect()
}

fn draw_label(img: &mut RgbaImage, label: &str, symbol: Symbol, options: &QrCodeOptions) {
    if label.trim().is_empty() {
        return;
    }
    let Some(mut layout) = label_layout(symbol.extent) else {
        log::warn!("QR symbol of {}px is too small for a label", symbol.extent);
        return;
    };
    layout.x += symbol.origin;
    layout.y += symbol.origin;

    let text = fit_label(label, layout.max_chars);
    if text.chars().count() < label.trim().chars().count() {
        log::debug!("QR label truncated to {:?}", text);
    }

    let fg = Rgba(options.foreground);
    let bg = Rgba(options.background);
    for y in layout.y..layout.y + layout.height {
        for x in layout.x..layout.x + layout.width {
            let border = x == layout.x
                || y == layout.y
                || x == layout.x + layout.width - 1
                || y == layout.y + layout.height - 1;
            img.put_pixel(x, y, if border { fg } else { bg });
        }
    }

    let scale = layout.scale;
    let count = text.chars().count() as u32;
    let text_width = count * GLYPH_ADVANCE * scale - scale;
    let origin_x = layout.x + (layout.width - text_width) / 2;
    let origin_y = layout.y + (layout.height - GLYPH_HEIGHT * scale) / 2;

    for (i, c) in text.chars().enumerate() {
        let glyph_x = origin_x + i as u32 * GLYPH_ADVANCE * scale;
        for gy in 0..GLYPH_HEIGHT {
            for gx in 0..GLYPH_WIDTH {
                if !glyphs::pixel(c, gx, gy) {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        img.put_pixel(glyph_x + gx * scale + dx, origin_y + gy * scale + dy, fg);
                    }
                }
            }
        }
    }
}

fn encode_png(img: RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| Error::Barcode(format!("PNG encoding error: {}", e)))?;
    Ok(buf)
}

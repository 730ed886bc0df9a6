//! The page-copy-and-stamp capability.

use std::io::Write;

use crate::error::{Error, Result};
use crate::geometry::Rect;

/// US Letter, used when a page declares no `MediaBox` anywhere in its tree.
pub const DEFAULT_MEDIA_BOX: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 612.0,
    height: 792.0,
};

/// Boxes of a page after inheritance is resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    /// Page boundaries
    pub media_box: Rect,
    /// Visible region, if narrower than the media box
    pub crop_box: Option<Rect>,
    /// Clockwise rotation in degrees (multiple of 90)
    pub rotate: i64,
}

impl PageBox {
    /// The region a viewer shows: the crop box if set, else the media box.
    pub fn visible(&self) -> Rect {
        self.crop_box.unwrap_or(self.media_box)
    }

    /// A `size` square inset by `margin` from the corner a viewer shows at
    /// the bottom right once `/Rotate` is applied.
    pub fn bottom_right_square(&self, size: f32, margin: f32) -> Rect {
        let visible = self.visible();
        let square = visible.bottom_right_square(size, margin);
        let side = square.width;
        match self.rotate.rem_euclid(360) {
            90 => Rect::new(square.x, visible.top() - margin - side, side, side),
            180 => Rect::new(visible.x + margin, visible.top() - margin - side, side, side),
            270 => Rect::new(visible.x + margin, square.y, side, side),
            _ => square,
        }
    }
}

impl Default for PageBox {
    fn default() -> Self {
        Self {
            media_box: DEFAULT_MEDIA_BOX,
            crop_box: None,
            rotate: 0,
        }
    }
}

/// An RGB image ready for embedding as a PDF image XObject.
///
/// Pixel data is zlib-compressed (`FlateDecode`); transparency, if any,
/// is carried as a separate compressed grey soft mask.
#[derive(Debug, Clone)]
pub struct StampImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Compressed DeviceRGB samples, 8 bits per component
    pub data: Vec<u8>,
    /// Compressed DeviceGray alpha samples
    pub soft_mask: Option<Vec<u8>>,
}

impl StampImage {
    /// Decode a PNG into compressed RGB samples and an optional soft mask.
    ///
    /// Fully opaque images carry no soft mask.
    pub fn from_png(png: &[u8]) -> Result<Self> {
        let img = image::load_from_memory_with_format(png, image::ImageFormat::Png)?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let soft_mask = if alpha.iter().all(|&a| a == u8::MAX) {
            None
        } else {
            Some(compress(&alpha)?)
        };

        Ok(Self {
            width,
            height,
            data: compress(&rgb)?,
            soft_mask,
        })
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// A PDF engine able to copy a document's pages, draw an image on one of
/// them, and serialize the result.
///
/// Signing logic only talks to this trait, so the engine can be replaced
/// without touching hashing or signing.
pub trait PdfEngine: Send + Sync {
    /// Parsed document handle.
    type Document;

    /// Engine name, for logs.
    fn name(&self) -> &str;

    /// Whether the engine can be used at all.
    ///
    /// A licence-gated or missing engine reports a `Configuration` error
    /// here, once, at signer construction.
    fn availability(&self) -> Result<()> {
        Ok(())
    }

    /// Parse `bytes`, failing with a `Validation` error if they are not a
    /// structurally sound PDF with at least one page.
    fn load(&self, bytes: &[u8]) -> Result<Self::Document>;

    /// Number of pages.
    fn page_count(&self, doc: &Self::Document) -> usize;

    /// Resolved boxes of the zero-based page `page_index`.
    fn page_box(&self, doc: &Self::Document, page_index: usize) -> Result<PageBox>;

    /// A new document holding a copy of every page of `source`, in order.
    fn copy_pages(&self, source: &Self::Document) -> Result<Self::Document>;

    /// Draw `image` on page `page_index`, scaled to fill `rect` (PDF user
    /// space, origin bottom-left).
    fn draw_image(
        &self,
        doc: &mut Self::Document,
        page_index: usize,
        image: &StampImage,
        rect: Rect,
    ) -> Result<()>;

    /// Serialize to PDF bytes.
    fn serialize(&self, doc: &mut Self::Document) -> Result<Vec<u8>>;
}

/// Stand-in for an engine that cannot be used, e.g. because its licence
/// does not cover stamping.
#[derive(Debug, Clone)]
pub struct UnavailableEngine {
    reason: String,
}

impl UnavailableEngine {
    /// Create an engine that always reports `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn refuse<T>(&self) -> Result<T> {
        Err(Error::Capability(format!("PDF engine unavailable: {}", self.reason)))
    }
}

impl PdfEngine for UnavailableEngine {
    type Document = ();

    fn name(&self) -> &str {
        "unavailable"
    }

    fn availability(&self) -> Result<()> {
        Err(Error::Configuration(format!("PDF engine unavailable: {}", self.reason)))
    }

    fn load(&self, _bytes: &[u8]) -> Result<()> {
        self.refuse()
    }

    fn page_count(&self, _doc: &()) -> usize {
        0
    }

    fn page_box(&self, _doc: &(), _page_index: usize) -> Result<PageBox> {
        self.refuse()
    }

    fn copy_pages(&self, _source: &()) -> Result<()> {
        self.refuse()
    }

    fn draw_image(
        &self,
        _doc: &mut (),
        _page: usize,
        _image: &StampImage,
        _rect: Rect,
    ) -> Result<()> {
        self.refuse()
    }

    fn serialize(&self, _doc: &mut ()) -> Result<Vec<u8>> {
        self.refuse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::{Rgba, RgbaImage};

    fn png(img: RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn inflate(data: &[u8]) -> Vec<u8> {
        use std::io::Read;
        let mut out = Vec::new();
        flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_stamp_corner_follows_rotation() {
        let mut page = PageBox::default();
        assert_eq!(page.bottom_right_square(100.0, 20.0), Rect::new(492.0, 20.0, 100.0, 100.0));

        page.rotate = 90;
        assert_eq!(page.bottom_right_square(100.0, 20.0), Rect::new(492.0, 672.0, 100.0, 100.0));
        page.rotate = 180;
        assert_eq!(page.bottom_right_square(100.0, 20.0), Rect::new(20.0, 672.0, 100.0, 100.0));
        page.rotate = -90;
        assert_eq!(page.bottom_right_square(100.0, 20.0), Rect::new(20.0, 20.0, 100.0, 100.0));
        page.rotate = 450;
        assert_eq!(page.bottom_right_square(100.0, 20.0), Rect::new(492.0, 672.0, 100.0, 100.0));
    }

    #[test]
    fn test_opaque_png_has_no_soft_mask() {
        let stamp = StampImage::from_png(&png(RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]))))
            .unwrap();
        assert_eq!((stamp.width, stamp.height), (4, 3));
        assert!(stamp.soft_mask.is_none());
        let rgb = inflate(&stamp.data);
        assert_eq!(rgb.len(), 4 * 3 * 3);
        assert_eq!(&rgb[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_transparent_png_keeps_alpha() {
        let stamp = StampImage::from_png(&png(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 128]))))
            .unwrap();
        let mask = inflate(stamp.soft_mask.as_ref().unwrap());
        assert_eq!(mask, vec![128; 4]);
    }

    #[test]
    fn test_invalid_png_is_capability_error() {
        let err = StampImage::from_png(b"not a png").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capability);
    }

    #[test]
    fn test_unavailable_engine() {
        let engine = UnavailableEngine::new("licence expired");
        assert_eq!(engine.availability().unwrap_err().kind(), ErrorKind::Configuration);
        let err = engine.load(b"%PDF-1.4").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capability);
        assert!(err.to_string().contains("licence expired"));
    }

    #[test]
    fn test_page_box_visible() {
        let crop = Rect::new(10.0, 10.0, 100.0, 100.0);
        let page = PageBox {
            crop_box: Some(crop),
            ..PageBox::default()
        };
        assert_eq!(page.visible(), crop);
        assert_eq!(PageBox::default().visible(), DEFAULT_MEDIA_BOX);
    }
}

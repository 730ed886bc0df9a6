//! Geometric primitives for stamp placement.
//!
//! Coordinates are PDF user space: origin at the bottom-left corner of the
//! page, units of 1/72 inch.

use serde::{Deserialize, Serialize};

/// A rectangle in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// X coordinate of the lower-left corner
    pub x: f32,
    /// Y coordinate of the lower-left corner
    pub y: f32,
    /// Width of rectangle
    pub width: f32,
    /// Height of rectangle
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle from position and dimensions.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_seal::geometry::Rect;
    ///
    /// let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
    /// assert_eq!(rect.width, 100.0);
    /// assert_eq!(rect.height, 50.0);
    /// ```
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle from two corner points, in any order.
    ///
    /// PDF boxes (`/MediaBox`, `/CropBox`) are stored this way.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_seal::geometry::Rect;
    ///
    /// let rect = Rect::from_points(612.0, 792.0, 0.0, 0.0);
    /// assert_eq!(rect.x, 0.0);
    /// assert_eq!(rect.width, 612.0);
    /// ```
    pub fn from_points(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Top edge.
    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    /// Whether the rectangle has a positive, finite area.
    pub fn is_drawable(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// A `size` x `size` square in the bottom-right corner of `self`,
    /// inset by `margin` from the right and bottom edges.
    ///
    /// The square is shrunk if the page is too small to hold it with margins.
    pub fn bottom_right_square(&self, size: f32, margin: f32) -> Rect {
        let size = size.min(self.width - 2.0 * margin).min(self.height - 2.0 * margin).max(1.0);
        Rect::new(self.right() - margin - size, self.y + margin, size, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points_normalises() {
        let rect = Rect::from_points(100.0, 50.0, 10.0, 20.0);
        assert_eq!(rect, Rect::new(10.0, 20.0, 90.0, 30.0));
    }

    #[test]
    fn test_bottom_right_square_letter() {
        let page = Rect::new(0.0, 0.0, 612.0, 792.0);
        let stamp = page.bottom_right_square(100.0, 20.0);
        assert_eq!(stamp, Rect::new(492.0, 20.0, 100.0, 100.0));
    }

    #[test]
    fn test_bottom_right_square_offset_box() {
        let page = Rect::from_points(10.0, 10.0, 622.0, 802.0);
        let stamp = page.bottom_right_square(100.0, 20.0);
        assert_eq!(stamp.right(), 602.0);
        assert_eq!(stamp.y, 30.0);
    }

    #[test]
    fn test_bottom_right_square_tiny_page() {
        let page = Rect::new(0.0, 0.0, 80.0, 80.0);
        let stamp = page.bottom_right_square(100.0, 20.0);
        assert_eq!(stamp.width, 40.0);
        assert_eq!(stamp.right(), 60.0);
    }

    #[test]
    fn test_is_drawable() {
        assert!(Rect::new(0.0, 0.0, 1.0, 1.0).is_drawable());
        assert!(!Rect::new(0.0, 0.0, 0.0, 1.0).is_drawable());
        assert!(!Rect::new(f32::NAN, 0.0, 1.0, 1.0).is_drawable());
    }
}

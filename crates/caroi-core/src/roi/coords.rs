use serde::{Deserialize, Serialize};

use crate::error::{CaroiError, Result};

/// Axis-aligned rectangle in frame pixel space.
///
/// The rectangle is half-open: it covers columns `x0..x1` and rows `y0..y1`,
/// so `x1 - x0` is the width in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoiCoords {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl RoiCoords {
    pub fn new(x0: usize, y0: usize, x1: usize, y1: usize) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Rectangle covering the whole frame.
    pub fn full_frame(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Normalize two arbitrary corner points (e.g. a drag gesture) into a
    /// rectangle clamped to the frame. Fails if nothing of it is left.
    pub fn from_corners(
        ax: i64,
        ay: i64,
        bx: i64,
        by: i64,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        let clamp = |v: i64, max: usize| v.clamp(0, max as i64) as usize;
        let coords = Self::new(
            clamp(ax.min(bx), width),
            clamp(ay.min(by), height),
            clamp(ax.max(bx), width),
            clamp(ay.max(by), height),
        );
        coords.validate(width, height)?;
        Ok(coords)
    }

    /// Fixed-size square around a pixel, shifted to stay inside the frame.
    /// Frames smaller than `size` yield the whole extent along that axis.
    pub fn centered(row: usize, col: usize, size: usize, width: usize, height: usize) -> Self {
        let size = size.max(1);
        let x0 = col.saturating_sub(size / 2).min(width.saturating_sub(size));
        let y0 = row.saturating_sub(size / 2).min(height.saturating_sub(size));
        Self::new(x0, y0, (x0 + size).min(width), (y0 + size).min(height))
    }

    /// True when the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &RoiCoords) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0)
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Geometric center `(x, y)` in pixel units.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.x0 + self.x1) as f64 / 2.0,
            (self.y0 + self.y1) as f64 / 2.0,
        )
    }

    /// Check ordering, non-zero area and frame bounds.
    pub fn validate(&self, width: usize, height: usize) -> Result<()> {
        if self.x0 >= self.x1 || self.y0 >= self.y1 {
            return Err(CaroiError::InvalidRoi(format!(
                "rectangle ({}, {}, {}, {}) is empty or not normalized",
                self.x0, self.y0, self.x1, self.y1
            )));
        }
        if self.x1 > width || self.y1 > height {
            return Err(CaroiError::InvalidRoi(format!(
                "rectangle ({}, {}, {}, {}) exceeds frame {}x{}",
                self.x0, self.y0, self.x1, self.y1, width, height
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for RoiCoords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})-({}, {})", self.x0, self.y0, self.x1, self.y1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_shifts_inside_frame() {
        let c = RoiCoords::centered(0, 0, 10, 50, 50);
        assert_eq!(c, RoiCoords::new(0, 0, 10, 10));

        let c = RoiCoords::centered(49, 49, 10, 50, 50);
        assert_eq!(c, RoiCoords::new(40, 40, 50, 50));

        let c = RoiCoords::centered(20, 30, 10, 50, 50);
        assert_eq!(c, RoiCoords::new(25, 15, 35, 25));
    }

    #[test]
    fn test_intersects_is_half_open() {
        let a = RoiCoords::new(0, 0, 4, 4);
        assert!(a.intersects(&RoiCoords::new(3, 3, 6, 6)));
        // Touching edges share no pixel.
        assert!(!a.intersects(&RoiCoords::new(4, 0, 8, 4)));
        assert!(!a.intersects(&RoiCoords::new(0, 4, 4, 8)));
    }

    #[test]
    fn test_centered_on_tiny_frame() {
        let c = RoiCoords::centered(1, 1, 10, 4, 3);
        assert_eq!(c, RoiCoords::new(0, 0, 4, 3));
    }
}

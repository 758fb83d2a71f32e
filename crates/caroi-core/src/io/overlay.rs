use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array2;

use crate::consts::{OVERLAY_FRAME_WEIGHT, OVERLAY_MAP_WEIGHT};
use crate::error::{CaroiError, Result};
use crate::fluctuation::FluctuationMap;
use crate::roi::RoiCoords;

const ROI_OUTLINE: Rgb<u8> = Rgb([255, 255, 255]);

/// JET colormap: blue -> cyan -> yellow -> red for `v` in [0, 1].
pub fn jet(v: f32) -> [f32; 3] {
    let v = v.clamp(0.0, 1.0);
    let channel = |offset: f32| (1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0);
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Blend the colorized fluctuation map over a grayscale frame.
///
/// The frame is stretched to its own min/max before blending.
pub fn render_overlay(frame: &Array2<f32>, map: &FluctuationMap) -> Result<RgbImage> {
    let (h, w) = frame.dim();
    if map.scores.dim() != (h, w) {
        return Err(CaroiError::InvalidDimensions {
            width: map.width() as u32,
            height: map.height() as u32,
        });
    }

    let (lo, hi) = frame
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;

    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (row, col) = (y as usize, x as usize);
        let gray = if range > 0.0 {
            (frame[[row, col]] - lo) / range
        } else {
            0.0
        };
        let color = jet(map.scores[[row, col]]);
        let mix = |c: f32| {
            ((OVERLAY_FRAME_WEIGHT * gray + OVERLAY_MAP_WEIGHT * c) * 255.0).clamp(0.0, 255.0) as u8
        };
        Rgb([mix(color[0]), mix(color[1]), mix(color[2])])
    }))
}

/// Draw one-pixel rectangle outlines for `rois` (half-open coordinates).
pub fn draw_rois(img: &mut RgbImage, rois: &[RoiCoords]) {
    let (w, h) = (img.width() as usize, img.height() as usize);
    for c in rois {
        if c.x1 == 0 || c.y1 == 0 || c.x0 >= w || c.y0 >= h {
            continue;
        }
        let (x1, y1) = (c.x1.min(w) - 1, c.y1.min(h) - 1);
        for x in c.x0..=x1 {
            img.put_pixel(x as u32, c.y0 as u32, ROI_OUTLINE);
            img.put_pixel(x as u32, y1 as u32, ROI_OUTLINE);
        }
        for y in c.y0..=y1 {
            img.put_pixel(c.x0 as u32, y as u32, ROI_OUTLINE);
            img.put_pixel(x1 as u32, y as u32, ROI_OUTLINE);
        }
    }
}

/// Render the overlay with ROI outlines and save it as PNG.
pub fn save_overlay(
    path: &Path,
    frame: &Array2<f32>,
    map: &FluctuationMap,
    rois: &[RoiCoords],
) -> Result<()> {
    let mut img = render_overlay(frame, map)?;
    draw_rois(&mut img, rois);
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jet_endpoints() {
        let low = jet(0.0);
        let high = jet(1.0);
        assert!(low[2] > low[0], "low end is blue");
        assert!(high[0] > high[2], "high end is red");
    }
}

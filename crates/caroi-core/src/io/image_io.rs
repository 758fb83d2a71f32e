use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, ImageFormat, Luma};
use ndarray::Array2;
use rayon::prelude::*;
use tracing::info;

use crate::error::{CaroiError, Result};
use crate::frame::{Frame, FrameBuffer};

const SEQUENCE_EXTENSIONS: &[&str] = &["tif", "tiff", "png"];

/// Save a [0, 1] intensity array as 16-bit grayscale TIFF.
pub fn save_tiff(data: &Array2<f32>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let pixels: Vec<u16> = data
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 65535.0) as u16)
        .collect();
    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels).ok_or(
        CaroiError::InvalidDimensions {
            width: w as u32,
            height: h as u32,
        },
    )?;
    img.save(path)?;
    Ok(())
}

/// Save a [0, 1] intensity array as 8-bit grayscale PNG.
pub fn save_png(data: &Array2<f32>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let img = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([(data[[y as usize, x as usize]].clamp(0.0, 1.0) * 255.0) as u8])
    });
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save an intensity array, choosing the format from the file extension.
pub fn save_image(data: &Array2<f32>, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => save_png(data, path),
        _ => save_tiff(data, path),
    }
}

/// Load one still as a normalized grayscale frame.
pub fn load_image(path: &Path) -> Result<Frame> {
    let gray = image::open(path)?.to_luma16();
    let (w, h) = gray.dimensions();
    let data = Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
        gray.get_pixel(col as u32, row as u32).0[0] as f32 / 65535.0
    });
    Ok(Frame::new(data, 16))
}

/// Stills in `dir` that belong to an image sequence, sorted by file name.
pub fn sequence_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| SEQUENCE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Load a directory of TIFF/PNG stills as one recording at `fps`.
pub fn load_image_sequence(dir: &Path, fps: f64) -> Result<FrameBuffer> {
    let files = sequence_files(dir)?;
    if files.is_empty() {
        return Err(CaroiError::VideoLoad(format!(
            "no TIFF or PNG images in {}",
            dir.display()
        )));
    }

    let mut frames: Vec<Frame> = files
        .par_iter()
        .map(|p| load_image(p))
        .collect::<Result<_>>()?;
    for (i, frame) in frames.iter_mut().enumerate() {
        frame.metadata.frame_index = i;
    }

    info!(dir = %dir.display(), frames = frames.len(), fps, "Image sequence loaded");
    FrameBuffer::new(frames, fps)
}

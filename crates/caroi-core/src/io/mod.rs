pub mod export;
pub mod image_io;
pub mod overlay;
pub mod ser;

use std::path::Path;

use crate::error::{CaroiError, Result};
use crate::frame::FrameBuffer;

use self::image_io::{load_image, load_image_sequence};
use self::ser::SerReader;

/// Load a recording from a SER file, a single still, or a directory of stills.
///
/// `fps` is used whenever the source carries no timing of its own.
pub fn load_frame_buffer(path: &Path, fps: f64) -> Result<FrameBuffer> {
    if path.is_dir() {
        return load_image_sequence(path, fps);
    }
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("ser") => SerReader::open(path)?.load(fps),
        Some("tif" | "tiff" | "png") => FrameBuffer::new(vec![load_image(path)?], fps),
        _ => Err(CaroiError::VideoLoad(format!(
            "unsupported input {}",
            path.display()
        ))),
    }
}

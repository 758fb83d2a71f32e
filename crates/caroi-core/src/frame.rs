use std::path::PathBuf;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::PARALLEL_FRAME_THRESHOLD;
use crate::error::{CaroiError, Result};

/// A single grayscale intensity frame.
/// Pixel values are f32, usually normalized to [0.0, 1.0] by the frame source.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Original bit depth before conversion (8 or 16)
    pub original_bit_depth: u8,
    /// Optional per-frame metadata
    pub metadata: FrameMetadata,
}

impl Frame {
    pub fn new(data: Array2<f32>, bit_depth: u8) -> Self {
        Self {
            data,
            original_bit_depth: bit_depth,
            metadata: FrameMetadata::default(),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Spatial mean of all pixels, accumulated in f64.
    pub fn mean(&self) -> f64 {
        let n = self.data.len();
        if n == 0 {
            return 0.0;
        }
        self.data.iter().map(|&v| v as f64).sum::<f64>() / n as f64
    }
}

#[derive(Clone, Debug, Default)]
pub struct FrameMetadata {
    pub frame_index: usize,
    pub timestamp_us: Option<u64>,
}

/// Decoded recording held in memory: an ordered sequence of equally sized
/// frames plus the sampling rate.
///
/// Construction validates the sequence; once built it is never mutated.
/// Sessions share it behind an `Arc` so worker tasks can read it freely.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    frames: Vec<Frame>,
    fps: f64,
    height: usize,
    width: usize,
}

impl FrameBuffer {
    pub fn new(frames: Vec<Frame>, fps: f64) -> Result<Self> {
        let first = frames
            .first()
            .ok_or_else(|| CaroiError::VideoLoad("empty frame sequence".into()))?;
        let (height, width) = first.data.dim();
        if height == 0 || width == 0 {
            return Err(CaroiError::VideoLoad(format!(
                "frame has zero area ({width}x{height})"
            )));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(CaroiError::VideoLoad(format!("invalid frame rate {fps}")));
        }

        for (i, frame) in frames.iter().enumerate() {
            if frame.data.dim() != (height, width) {
                let (h, w) = frame.data.dim();
                return Err(CaroiError::VideoLoad(format!(
                    "frame {i} is {w}x{h}, expected {width}x{height}"
                )));
            }
            if frame.data.iter().any(|v| !v.is_finite()) {
                return Err(CaroiError::VideoLoad(format!(
                    "frame {i} contains non-finite pixel values"
                )));
            }
        }

        Ok(Self {
            frames,
            fps,
            height,
            width,
        })
    }

    /// Build from bare arrays, tagging each frame with its index.
    pub fn from_arrays(arrays: Vec<Array2<f32>>, fps: f64) -> Result<Self> {
        let frames = arrays
            .into_iter()
            .enumerate()
            .map(|(i, data)| {
                let mut frame = Frame::new(data, 32);
                frame.metadata.frame_index = i;
                frame
            })
            .collect();
        Self::new(frames, fps)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn duration_s(&self) -> f64 {
        self.len() as f64 / self.fps
    }

    /// Sample times in seconds: `i / fps`.
    pub fn time_points(&self) -> Vec<f64> {
        (0..self.len()).map(|i| i as f64 / self.fps).collect()
    }

    /// Spatial mean intensity of every frame (the bleaching signal).
    pub fn mean_intensity(&self) -> Vec<f64> {
        if self.len() >= PARALLEL_FRAME_THRESHOLD {
            self.frames.par_iter().map(Frame::mean).collect()
        } else {
            self.frames.iter().map(Frame::mean).collect()
        }
    }

    pub fn summary(&self) -> VideoSummary {
        let first = &self.frames[0].data;
        let (min, max) = first
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        VideoSummary {
            frame_count: self.len(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            duration_s: self.duration_s(),
            first_frame_mean: self.frames[0].mean(),
            first_frame_min: min,
            first_frame_max: max,
        }
    }
}

/// Lightweight description of a loaded recording, returned to callers on load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub frame_count: usize,
    pub width: usize,
    pub height: usize,
    pub fps: f64,
    pub duration_s: f64,
    pub first_frame_mean: f64,
    pub first_frame_min: f32,
    pub first_frame_max: f32,
}

/// Color layout of the source data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ColorMode {
    Mono,
    Bayer,
    RGB,
    BGR,
}

/// Metadata about the source file.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub filename: PathBuf,
    pub total_frames: usize,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_mode: ColorMode,
    /// Frame rate derived from container timestamps, if available.
    pub fps: Option<f64>,
    pub instrument: Option<String>,
}

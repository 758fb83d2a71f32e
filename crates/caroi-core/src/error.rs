use thiserror::Error;

use crate::bleaching::FitError;

#[derive(Error, Debug)]
pub enum CaroiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SER file: {0}")]
    InvalidSer(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Video load failed: {0}")]
    VideoLoad(String),

    #[error("No video loaded")]
    NoVideoLoaded,

    #[error("Bleaching fit failed: {0}")]
    Fit(#[from] FitError),

    #[error("Invalid ROI: {0}")]
    InvalidRoi(String),

    #[error("Unknown ROI id {0}")]
    UnknownRoi(u64),

    #[error("Stale result from epoch {result_epoch} (current epoch {current_epoch})")]
    StaleResult {
        result_epoch: u64,
        current_epoch: u64,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Session worker has stopped")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, CaroiError>;

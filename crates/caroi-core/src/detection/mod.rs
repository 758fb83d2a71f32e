pub mod auto_roi;
pub mod cluster;
pub mod config;
pub mod suppression;
pub mod threshold;

pub use auto_roi::{detect_rois, AutoRoiCandidate, AutoRoiResult, AutoRoiStats};
pub use config::AutoRoiConfig;

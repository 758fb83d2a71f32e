use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_AUTO_ROI_SIZE, DEFAULT_CLUSTER_COUNT, DEFAULT_MAX_AUTO_ROIS,
    DEFAULT_MIN_DISTANCE_FRACTION, DEFAULT_THRESHOLD_PERCENTILE,
};
use crate::error::{CaroiError, Result};

/// Configuration for automatic ROI detection from a fluctuation map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoRoiConfig {
    /// Whole-map percentile (0-100) a pixel score must reach to be a candidate.
    #[serde(default = "default_threshold_percentile")]
    pub threshold_percentile: f64,
    /// Minimum center spacing as a fraction of frame width. 0 turns off the
    /// distance check; rectangles are kept disjoint regardless.
    #[serde(default = "default_min_distance_fraction")]
    pub min_distance_fraction: f64,
    /// Number of similarity groups for trace clustering.
    #[serde(default = "default_cluster_count")]
    pub cluster_count: usize,
    /// Side length in pixels of each detected ROI square.
    #[serde(default = "default_roi_size")]
    pub roi_size: usize,
    /// Upper bound on the number of ROIs returned.
    #[serde(default = "default_max_rois")]
    pub max_rois: usize,
}

fn default_threshold_percentile() -> f64 {
    DEFAULT_THRESHOLD_PERCENTILE
}
fn default_min_distance_fraction() -> f64 {
    DEFAULT_MIN_DISTANCE_FRACTION
}
fn default_cluster_count() -> usize {
    DEFAULT_CLUSTER_COUNT
}
fn default_roi_size() -> usize {
    DEFAULT_AUTO_ROI_SIZE
}
fn default_max_rois() -> usize {
    DEFAULT_MAX_AUTO_ROIS
}

impl Default for AutoRoiConfig {
    fn default() -> Self {
        Self {
            threshold_percentile: DEFAULT_THRESHOLD_PERCENTILE,
            min_distance_fraction: DEFAULT_MIN_DISTANCE_FRACTION,
            cluster_count: DEFAULT_CLUSTER_COUNT,
            roi_size: DEFAULT_AUTO_ROI_SIZE,
            max_rois: DEFAULT_MAX_AUTO_ROIS,
        }
    }
}

impl AutoRoiConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.threshold_percentile) {
            return Err(CaroiError::InvalidParameter(format!(
                "threshold percentile must be in [0, 100], got {}",
                self.threshold_percentile
            )));
        }
        if !(0.0..=1.0).contains(&self.min_distance_fraction) {
            return Err(CaroiError::InvalidParameter(format!(
                "min distance fraction must be in [0, 1], got {}",
                self.min_distance_fraction
            )));
        }
        if self.cluster_count == 0 {
            return Err(CaroiError::InvalidParameter(
                "cluster count must be at least 1".into(),
            ));
        }
        if self.roi_size == 0 || self.max_rois == 0 {
            return Err(CaroiError::InvalidParameter(
                "ROI size and ROI cap must be positive".into(),
            ));
        }
        Ok(())
    }
}

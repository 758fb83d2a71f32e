use serde::{Deserialize, Serialize};

use crate::bleaching::BleachKind;
use crate::detection::AutoRoiConfig;
use crate::error::{CaroiError, Result};
use crate::roi::TraceSettings;

/// What happens to registered ROIs when a new recording is loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoiRetention {
    /// Keep ROIs that still fit inside the new frame; drop the rest.
    #[default]
    Retain,
    /// Start every recording with an empty registry.
    Clear,
}

/// Session-wide settings. Every field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bleaching model used for trace correction.
    #[serde(default)]
    pub fit_preference: BleachKind,
    #[serde(default = "default_adjust_bleaching")]
    pub adjust_bleaching: bool,
    /// Default smoothing strength in [0, 1] for trace queries.
    #[serde(default)]
    pub smoothing_alpha: f64,
    #[serde(default)]
    pub roi_retention: RoiRetention,
    #[serde(default)]
    pub auto_roi: AutoRoiConfig,
}

fn default_adjust_bleaching() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fit_preference: BleachKind::default(),
            adjust_bleaching: default_adjust_bleaching(),
            smoothing_alpha: 0.0,
            roi_retention: RoiRetention::default(),
            auto_roi: AutoRoiConfig::default(),
        }
    }
}

/// Partial update of a [`SessionConfig`]; `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfigPatch {
    #[serde(default)]
    pub fit_preference: Option<BleachKind>,
    #[serde(default)]
    pub adjust_bleaching: Option<bool>,
    #[serde(default)]
    pub smoothing_alpha: Option<f64>,
    #[serde(default)]
    pub roi_retention: Option<RoiRetention>,
    #[serde(default)]
    pub auto_roi: Option<AutoRoiConfigPatch>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoRoiConfigPatch {
    #[serde(default)]
    pub threshold_percentile: Option<f64>,
    #[serde(default)]
    pub min_distance_fraction: Option<f64>,
    #[serde(default)]
    pub cluster_count: Option<usize>,
    #[serde(default)]
    pub roi_size: Option<usize>,
    #[serde(default)]
    pub max_rois: Option<usize>,
}

impl SessionConfig {
    /// Apply `patch` on top of `self`, returning the validated result.
    /// `self` is untouched when validation fails.
    pub fn merge(&self, patch: &SessionConfigPatch) -> Result<SessionConfig> {
        let mut merged = self.clone();
        if let Some(kind) = patch.fit_preference {
            merged.fit_preference = kind;
        }
        if let Some(adjust) = patch.adjust_bleaching {
            merged.adjust_bleaching = adjust;
        }
        if let Some(alpha) = patch.smoothing_alpha {
            merged.smoothing_alpha = alpha;
        }
        if let Some(retention) = patch.roi_retention {
            merged.roi_retention = retention;
        }
        if let Some(auto) = &patch.auto_roi {
            let target = &mut merged.auto_roi;
            if let Some(v) = auto.threshold_percentile {
                target.threshold_percentile = v;
            }
            if let Some(v) = auto.min_distance_fraction {
                target.min_distance_fraction = v;
            }
            if let Some(v) = auto.cluster_count {
                target.cluster_count = v;
            }
            if let Some(v) = auto.roi_size {
                target.roi_size = v;
            }
            if let Some(v) = auto.max_rois {
                target.max_rois = v;
            }
        }
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.smoothing_alpha) {
            return Err(CaroiError::InvalidParameter(format!(
                "smoothing alpha must be in [0, 1], got {}",
                self.smoothing_alpha
            )));
        }
        self.auto_roi.validate()
    }

    /// Trace post-processing settings implied by this configuration.
    pub fn trace_settings(&self) -> TraceSettings {
        TraceSettings {
            fit_kind: self.fit_preference,
            adjust_bleaching: self.adjust_bleaching,
            smoothing_alpha: self.smoothing_alpha,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_only_touches_set_fields() {
        let base = SessionConfig::default();
        let patch = SessionConfigPatch {
            smoothing_alpha: Some(0.4),
            auto_roi: Some(AutoRoiConfigPatch {
                roi_size: Some(6),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = base.merge(&patch).unwrap();
        assert_eq!(merged.smoothing_alpha, 0.4);
        assert_eq!(merged.auto_roi.roi_size, 6);
        assert_eq!(merged.fit_preference, base.fit_preference);
        assert_eq!(
            merged.auto_roi.threshold_percentile,
            base.auto_roi.threshold_percentile
        );
    }

    #[test]
    fn test_merge_rejects_invalid_alpha() {
        let patch = SessionConfigPatch {
            smoothing_alpha: Some(2.0),
            ..Default::default()
        };
        assert!(SessionConfig::default().merge(&patch).is_err());
    }

    #[test]
    fn test_empty_document_gives_defaults() {
        let cfg: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, SessionConfig::default());
    }
}

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bleaching::{BleachKind, BleachingFit};
use crate::consts::{EPSILON, SMOOTHING_MAX_RETENTION};
use crate::error::{CaroiError, Result};
use crate::frame::FrameBuffer;

use super::cache::TraceKey;
use super::coords::RoiCoords;
use super::RoiId;

/// Post-processing settings that determine a trace's fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceSettings {
    pub fit_kind: BleachKind,
    pub adjust_bleaching: bool,
    pub smoothing_alpha: f64,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            fit_kind: BleachKind::default(),
            adjust_bleaching: true,
            smoothing_alpha: 0.0,
        }
    }
}

/// Mean intensity over an ROI, as measured and after post-processing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntensityTrace {
    pub raw: Vec<f64>,
    /// Bleach-corrected trace (equal to `raw` when correction is off or no fit exists).
    pub corrected: Vec<f64>,
    /// `corrected` after smoothing; this is what gets presented.
    pub smoothed: Vec<f64>,
    pub time_points: Vec<f64>,
    pub key: TraceKey,
}

/// Per-frame mean of the pixels inside `coords`.
///
/// The rectangle is half-open: columns `x0..x1`, rows `y0..y1`.
pub fn raw_trace(frames: &FrameBuffer, coords: &RoiCoords) -> Result<Vec<f64>> {
    coords.validate(frames.width(), frames.height())?;
    let area = coords.area() as f64;

    Ok(frames
        .frames()
        .iter()
        .map(|frame| {
            let sum: f64 = frame
                .data
                .slice(ndarray::s![coords.y0..coords.y1, coords.x0..coords.x1])
                .iter()
                .map(|&v| v as f64)
                .sum();
            sum / area
        })
        .collect())
}

/// Remove the fitted bleaching trend from a raw trace.
///
/// Each sample is divided by the fitted curve at its time point, and the
/// result is rescaled so its mean matches the raw mean. Returns `raw`
/// unchanged when `adjust` is false, no fit is available, or the fit cannot
/// be evaluated safely over the trace.
pub fn correct(raw: &[f64], fit: Option<&BleachingFit>, adjust: bool) -> Vec<f64> {
    let fit = match fit {
        Some(fit) if adjust => fit,
        _ => return raw.to_vec(),
    };
    if fit.time_points.len() != raw.len() {
        warn!(
            trace_len = raw.len(),
            fit_len = fit.time_points.len(),
            "Bleaching fit does not cover trace, skipping correction"
        );
        return raw.to_vec();
    }

    let curve = fit.curve();
    if curve.iter().any(|c| !c.is_finite() || c.abs() <= EPSILON) {
        warn!(model = %fit.kind, "Bleaching curve not invertible, skipping correction");
        return raw.to_vec();
    }

    let ratio: Vec<f64> = raw.iter().zip(&curve).map(|(&r, &c)| r / c).collect();
    if raw.is_empty() {
        return ratio;
    }

    let n = raw.len() as f64;
    let raw_mean = raw.iter().sum::<f64>() / n;
    let ratio_mean = ratio.iter().sum::<f64>() / n;
    let scale = raw_mean / ratio_mean;
    if !scale.is_finite() || ratio_mean.abs() <= EPSILON {
        return ratio;
    }
    ratio.into_iter().map(|v| v * scale).collect()
}

/// Exponential smoothing with strength `alpha` in [0, 1].
///
/// `alpha = 0` returns the trace untouched. Otherwise a bias-corrected
/// exponential moving average is applied whose retention factor
/// `alpha * SMOOTHING_MAX_RETENTION` grows with alpha, so larger alpha means
/// a longer effective window.
pub fn smooth(trace: &[f64], alpha: f64) -> Result<Vec<f64>> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(CaroiError::InvalidParameter(format!(
            "smoothing alpha must be in [0, 1], got {alpha}"
        )));
    }
    if alpha == 0.0 {
        return Ok(trace.to_vec());
    }

    let retention = alpha * SMOOTHING_MAX_RETENTION;
    let mut state = 0.0;
    let mut bias = 1.0;
    Ok(trace
        .iter()
        .map(|&x| {
            state = retention * state + (1.0 - retention) * x;
            bias *= retention;
            state / (1.0 - bias)
        })
        .collect())
}

/// Extract, correct and smooth the trace of one ROI.
pub fn extract_trace(
    frames: &FrameBuffer,
    roi_id: RoiId,
    coords: &RoiCoords,
    fit: Option<&BleachingFit>,
    settings: &TraceSettings,
) -> Result<IntensityTrace> {
    let raw = raw_trace(frames, coords)?;
    process_trace(frames, raw, roi_id, coords, fit, settings)
}

/// Post-process an already measured raw trace.
pub(crate) fn process_trace(
    frames: &FrameBuffer,
    raw: Vec<f64>,
    roi_id: RoiId,
    coords: &RoiCoords,
    fit: Option<&BleachingFit>,
    settings: &TraceSettings,
) -> Result<IntensityTrace> {
    let fit = fit.filter(|f| f.kind == settings.fit_kind);
    let corrected = correct(&raw, fit, settings.adjust_bleaching);
    let smoothed = smooth(&corrected, settings.smoothing_alpha)?;
    Ok(IntensityTrace {
        raw,
        corrected,
        smoothed,
        time_points: frames.time_points(),
        key: TraceKey::new(roi_id, *coords, settings),
    })
}

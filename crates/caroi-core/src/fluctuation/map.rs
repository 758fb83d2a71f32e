use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use crate::consts::{EPSILON, FLUCTUATION_DETREND_DEGREE, PARALLEL_PIXEL_THRESHOLD};
use crate::frame::FrameBuffer;

use super::detrend::{polyfit, polyval};

/// Per-pixel temporal variability, normalized to [0, 1] across the frame.
#[derive(Clone, Debug)]
pub struct FluctuationMap {
    /// Normalized scores, shape = (height, width).
    pub scores: Array2<f32>,
    /// Smallest raw (unnormalized) standard deviation in the frame.
    pub raw_min: f64,
    /// Largest raw standard deviation in the frame.
    pub raw_max: f64,
}

impl FluctuationMap {
    pub fn width(&self) -> usize {
        self.scores.ncols()
    }

    pub fn height(&self) -> usize {
        self.scores.nrows()
    }

    /// Score value at the given whole-map percentile (0-100).
    pub fn percentile(&self, p: f64) -> f32 {
        let values: Vec<f32> = self.scores.iter().copied().collect();
        percentile(&values, p)
    }

    /// True when every pixel has the same score, i.e. nothing stands out.
    pub fn is_uniform(&self) -> bool {
        let (lo, hi) = self
            .scores
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let spread = hi - lo;
        !spread.is_finite() || spread <= f32::EPSILON
    }
}

/// Percentile (0-100) of a sample with linear interpolation between order
/// statistics. Empty input yields 0.
pub fn percentile(values: &[f32], p: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f32::total_cmp);

    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Compute the fluctuation map of a recording.
///
/// The global bleaching trend (quadratic fit of the mean-intensity signal)
/// is subtracted from every pixel's time series; the score is the standard
/// deviation of what remains, min-max rescaled so percentile thresholds
/// are comparable between recordings. Zero-variance pixels, and every pixel
/// of a uniform map, get score 0.
pub fn compute_fluctuation_map(frames: &FrameBuffer) -> FluctuationMap {
    let (h, w) = (frames.height(), frames.width());
    let n = frames.len();

    let mean_intensity = frames.mean_intensity();
    let frame_index: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let coeffs = polyfit(&frame_index, &mean_intensity, FLUCTUATION_DETREND_DEGREE);
    let trend: Vec<f64> = frame_index.iter().map(|&x| polyval(&coeffs, x)).collect();

    let row_stddev = |row: usize| -> Vec<f64> {
        // Welford accumulation per column, frames in order.
        let mut mean = vec![0.0_f64; w];
        let mut m2 = vec![0.0_f64; w];
        for (t, frame) in frames.frames().iter().enumerate() {
            let k = (t + 1) as f64;
            let pixels = frame.data.row(row);
            for (col, &v) in pixels.iter().enumerate() {
                let x = v as f64 - trend[t];
                let delta = x - mean[col];
                mean[col] += delta / k;
                m2[col] += delta * (x - mean[col]);
            }
        }
        m2.into_iter()
            .map(|s| {
                let sd = (s / n as f64).max(0.0).sqrt();
                if sd.is_finite() {
                    sd
                } else {
                    0.0
                }
            })
            .collect()
    };

    let rows: Vec<Vec<f64>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(row_stddev).collect()
    } else {
        (0..h).map(row_stddev).collect()
    };

    let raw_min = rows.iter().flatten().copied().fold(f64::INFINITY, f64::min);
    let raw_max = rows
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let range = raw_max - raw_min;
    let degenerate = !range.is_finite() || range <= EPSILON * raw_max.abs().max(1.0);

    let mut scores = Array2::<f32>::zeros((h, w));
    if !degenerate {
        for (row, values) in rows.iter().enumerate() {
            for (col, &sd) in values.iter().enumerate() {
                let s = ((sd - raw_min) / range) as f32;
                scores[[row, col]] = if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 };
            }
        }
    }

    debug!(
        width = w,
        height = h,
        frames = n,
        raw_min,
        raw_max,
        degenerate,
        "Fluctuation map computed"
    );

    FluctuationMap {
        scores,
        raw_min: if raw_min.is_finite() { raw_min } else { 0.0 },
        raw_max: if raw_max.is_finite() { raw_max } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 50.0), 3.0);
        assert_eq!(percentile(&v, 100.0), 5.0);
        assert!((percentile(&v, 12.5) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_is_uniform() {
        let flat = FluctuationMap {
            scores: Array2::zeros((3, 4)),
            raw_min: 0.2,
            raw_max: 0.2,
        };
        assert!(flat.is_uniform());

        let mut scores = Array2::zeros((3, 4));
        scores[[1, 2]] = 1.0;
        let spread = FluctuationMap {
            scores,
            raw_min: 0.0,
            raw_max: 1.0,
        };
        assert!(!spread.is_uniform());
    }
}

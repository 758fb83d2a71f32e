use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::PARALLEL_ROI_THRESHOLD;
use crate::error::{CaroiError, Result};
use crate::fluctuation::FluctuationMap;
use crate::frame::FrameBuffer;
use crate::roi::{raw_trace, RoiCoords};

use super::cluster::{kmeans, normalize_trace, standardize_features};
use super::config::AutoRoiConfig;
use super::suppression::suppress;
use super::threshold::candidate_pixels;

/// One automatically detected ROI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoRoiCandidate {
    pub coords: RoiCoords,
    /// Peak pixel `(row, col)` the rectangle was built around.
    pub center: (usize, usize),
    /// Fluctuation score of the peak pixel.
    pub score: f32,
    pub average_trace: Vec<f64>,
    /// Similarity group; labels only, never used for filtering.
    pub cluster: Option<usize>,
}

/// Summary numbers of a detection run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoRoiStats {
    /// Pixels at or above the percentile cutoff, before suppression.
    pub candidate_pixels: usize,
    pub cutoff: f32,
    pub min_distance_px: f64,
    pub accepted: usize,
    /// Share of the frame covered by the union of all rectangles.
    pub coverage_percent: f64,
    pub cluster_sizes: Vec<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoRoiResult {
    pub candidates: Vec<AutoRoiCandidate>,
    pub stats: AutoRoiStats,
}

/// Detect candidate ROIs from a fluctuation map.
///
/// Pipeline: percentile threshold -> score ranking -> greedy non-maximum
/// suppression -> fixed-size rectangles -> average traces -> k-means labels.
///
/// Results are ordered by descending peak score and their rectangles are
/// pairwise disjoint. A uniform map, or an empty candidate set, yields an
/// empty result rather than an error.
pub fn detect_rois(
    map: &FluctuationMap,
    frames: &FrameBuffer,
    config: &AutoRoiConfig,
) -> Result<AutoRoiResult> {
    config.validate()?;
    let (h, w) = (map.height(), map.width());
    if (h, w) != (frames.height(), frames.width()) {
        return Err(CaroiError::InvalidParameter(format!(
            "fluctuation map is {}x{} but frames are {}x{}",
            w,
            h,
            frames.width(),
            frames.height()
        )));
    }

    let min_distance_px = config.min_distance_fraction * w as f64;
    if map.is_uniform() {
        info!("Fluctuation map is uniform, no ROIs detected");
        return Ok(AutoRoiResult {
            candidates: Vec::new(),
            stats: AutoRoiStats {
                cutoff: map.percentile(config.threshold_percentile),
                min_distance_px,
                ..Default::default()
            },
        });
    }

    // Step 1: Percentile threshold over the whole map, ranked by score.
    let (cutoff, candidates) = candidate_pixels(&map.scores, config.threshold_percentile);

    // Step 2: Greedy suppression of nearby centers and overlapping squares.
    let accepted = suppress(&candidates, min_distance_px, config.max_rois, |c| {
        RoiCoords::centered(c.row, c.col, config.roi_size, w, h)
    });
    let candidate_count = candidates.len();
    debug!(
        candidate_pixels = candidate_count,
        accepted = accepted.len(),
        cutoff,
        min_distance_px,
        "Auto-ROI suppression done"
    );

    // Step 3: Fixed-size rectangles around each accepted center.
    let rects: Vec<(RoiCoords, usize, usize, f32)> = accepted
        .iter()
        .map(|c| {
            (
                RoiCoords::centered(c.row, c.col, config.roi_size, w, h),
                c.row,
                c.col,
                c.score,
            )
        })
        .collect();

    // Step 4: Average intensity trace per rectangle.
    let traces: Vec<Vec<f64>> = if rects.len() >= PARALLEL_ROI_THRESHOLD {
        rects
            .par_iter()
            .map(|(coords, ..)| raw_trace(frames, coords))
            .collect::<Result<_>>()?
    } else {
        rects
            .iter()
            .map(|(coords, ..)| raw_trace(frames, coords))
            .collect::<Result<_>>()?
    };

    // Step 5: Group by trace shape.
    let features: Vec<Vec<f64>> = traces.iter().map(|t| normalize_trace(t)).collect();
    let clustering = kmeans(&standardize_features(&features), config.cluster_count);

    let coverage_percent = coverage(&rects, h, w);
    let candidates: Vec<AutoRoiCandidate> = rects
        .into_iter()
        .zip(traces)
        .enumerate()
        .map(|(i, ((coords, row, col, score), average_trace))| AutoRoiCandidate {
            coords,
            center: (row, col),
            score,
            average_trace,
            cluster: clustering.labels.get(i).copied(),
        })
        .collect();

    let stats = AutoRoiStats {
        candidate_pixels: candidate_count,
        cutoff,
        min_distance_px,
        accepted: candidates.len(),
        coverage_percent,
        cluster_sizes: clustering.sizes(),
    };

    info!(
        rois = stats.accepted,
        candidate_pixels = stats.candidate_pixels,
        coverage_percent = stats.coverage_percent,
        "Auto-ROI detection complete"
    );

    Ok(AutoRoiResult { candidates, stats })
}

fn coverage(rects: &[(RoiCoords, usize, usize, f32)], h: usize, w: usize) -> f64 {
    if h == 0 || w == 0 {
        return 0.0;
    }
    let mut mask = Array2::<bool>::from_elem((h, w), false);
    for (c, ..) in rects {
        mask.slice_mut(ndarray::s![c.y0..c.y1, c.x0..c.x1]).fill(true);
    }
    let covered = mask.iter().filter(|&&m| m).count();
    covered as f64 / (h * w) as f64 * 100.0
}

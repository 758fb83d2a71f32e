use ndarray::Array2;

use crate::fluctuation::percentile;

/// A pixel that passed the percentile threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub row: usize,
    pub col: usize,
    pub score: f32,
}

/// All pixels scoring at or above the whole-map `p`-th percentile, ordered by
/// descending score. Equal scores keep row-major order, so the lower pixel
/// index always comes first.
///
/// Returns the cutoff together with the candidates.
pub fn candidate_pixels(scores: &Array2<f32>, p: f64) -> (f32, Vec<Candidate>) {
    let values: Vec<f32> = scores.iter().copied().collect();
    let cutoff = percentile(&values, p);

    let mut candidates: Vec<Candidate> = scores
        .indexed_iter()
        .filter(|(_, &s)| s >= cutoff)
        .map(|((row, col), &score)| Candidate { row, col, score })
        .collect();
    // Stable sort keeps row-major order among ties.
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    (cutoff, candidates)
}

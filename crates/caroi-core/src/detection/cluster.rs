//! Deterministic k-means grouping of ROI traces by shape.

use crate::consts::{EPSILON, KMEANS_MAX_ITERATIONS};

/// Result of clustering a set of feature vectors.
#[derive(Clone, Debug, Default)]
pub struct Clustering {
    /// Cluster index for every input vector, in input order.
    pub labels: Vec<usize>,
    pub centers: Vec<Vec<f64>>,
    pub iterations: usize,
}

impl Clustering {
    /// Number of members in each cluster.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centers.len()];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }
}

/// Z-normalize a trace so clustering compares shape, not brightness.
/// A flat trace becomes all zeros.
pub fn normalize_trace(trace: &[f64]) -> Vec<f64> {
    let n = trace.len();
    if n == 0 {
        return Vec::new();
    }
    let mean = trace.iter().sum::<f64>() / n as f64;
    let sd = (trace.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
    if sd <= EPSILON || !sd.is_finite() {
        return vec![0.0; n];
    }
    trace.iter().map(|&v| (v - mean) / sd).collect()
}

/// Standardize every feature (column) to zero mean and unit variance.
/// Constant features are centered only.
pub fn standardize_features(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(dim) = rows.first().map(Vec::len) else {
        return Vec::new();
    };
    let n = rows.len() as f64;
    let mut out = rows.to_vec();
    for j in 0..dim {
        let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
        let sd = (rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n).sqrt();
        let scale = if sd > EPSILON { sd } else { 1.0 };
        for r in out.iter_mut() {
            r[j] = (r[j] - mean) / scale;
        }
    }
    out
}

/// Lloyd's k-means with farthest-point seeding.
///
/// Seeding starts from the first vector and repeatedly adds the vector
/// farthest from all chosen centers; ties and assignments resolve to the
/// lowest index, so identical input always gives identical labels. `k` is
/// reduced to the number of vectors when there are fewer.
pub fn kmeans(points: &[Vec<f64>], k: usize) -> Clustering {
    let n = points.len();
    if n == 0 || k == 0 {
        return Clustering::default();
    }
    let k = k.min(n);

    let mut centers = vec![points[0].clone()];
    let mut nearest: Vec<f64> = points.iter().map(|p| sq_dist(p, &points[0])).collect();
    while centers.len() < k {
        let (far, _) = nearest
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bd), (i, &d)| {
                if d > bd {
                    (i, d)
                } else {
                    (bi, bd)
                }
            });
        centers.push(points[far].clone());
        for (i, p) in points.iter().enumerate() {
            nearest[i] = nearest[i].min(sq_dist(p, &points[far]));
        }
    }

    let mut labels = vec![usize::MAX; n];
    let mut iterations = 0;
    for iter in 0..KMEANS_MAX_ITERATIONS {
        iterations = iter + 1;
        let mut changed = false;
        for (i, p) in points.iter().enumerate() {
            let label = nearest_center(p, &centers);
            if labels[i] != label {
                labels[i] = label;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let dim = points[0].len();
        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &l) in points.iter().zip(&labels) {
            counts[l] += 1;
            for (s, &v) in sums[l].iter_mut().zip(p) {
                *s += v;
            }
        }
        for c in 0..k {
            // Empty clusters keep their previous center.
            if counts[c] > 0 {
                centers[c] = sums[c].iter().map(|s| s / counts[c] as f64).collect();
            }
        }
    }

    Clustering {
        labels,
        centers,
        iterations,
    }
}

fn nearest_center(p: &[f64], centers: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (c, center) in centers.iter().enumerate() {
        let d = sq_dist(p, center);
        if d < best_d {
            best = c;
            best_d = d;
        }
    }
    best
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

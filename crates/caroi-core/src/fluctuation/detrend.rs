//! Polynomial trend removal for the global bleaching signal.

use crate::consts::EPSILON;

/// Least-squares polynomial fit. Returns coefficients lowest order first.
///
/// The degree is reduced when there are too few samples to determine it,
/// so a single sample yields a constant.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Vec<f64> {
    let n = x.len().min(y.len());
    if n == 0 {
        return vec![0.0];
    }
    let degree = degree.min(n - 1);
    let size = degree + 1;

    // Center x to keep the normal equations well conditioned.
    let x_mean = x[..n].iter().sum::<f64>() / n as f64;
    let x_scale = x[..n]
        .iter()
        .map(|&v| (v - x_mean).abs())
        .fold(0.0_f64, f64::max)
        .max(EPSILON);

    let mut ata = vec![vec![0.0; size]; size];
    let mut aty = vec![0.0; size];
    for i in 0..n {
        let u = (x[i] - x_mean) / x_scale;
        let mut powers = vec![1.0; size];
        for k in 1..size {
            powers[k] = powers[k - 1] * u;
        }
        for r in 0..size {
            aty[r] += powers[r] * y[i];
            for c in 0..size {
                ata[r][c] += powers[r] * powers[c];
            }
        }
    }

    let centered = solve_linear(ata, aty).unwrap_or_else(|| {
        let mean = y[..n].iter().sum::<f64>() / n as f64;
        let mut c = vec![0.0; size];
        c[0] = mean;
        c
    });

    uncenter(&centered, x_mean, x_scale)
}

/// Evaluate a polynomial (coefficients lowest order first) at `x`.
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Rewrite `p((x - m) / s)` as a polynomial in `x`.
fn uncenter(centered: &[f64], mean: f64, scale: f64) -> Vec<f64> {
    let size = centered.len();
    let mut out = vec![0.0; size];
    // (x - m)^k expanded with binomial coefficients.
    for (k, &ck) in centered.iter().enumerate() {
        let factor = ck / scale.powi(k as i32);
        let mut binom = 1.0;
        for j in 0..=k {
            // term: C(k, j) x^j (-m)^(k-j)
            out[j] += factor * binom * (-mean).powi((k - j) as i32);
            binom = binom * (k - j) as f64 / (j + 1) as f64;
        }
    }
    out
}

/// Gaussian elimination with partial pivoting. `None` for singular systems.
fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < EPSILON {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let f = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

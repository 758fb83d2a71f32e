use tracing::debug;

use crate::consts::{
    EPSILON, FIT_INITIAL_LAMBDA, FIT_MAX_ITERATIONS, FIT_MAX_LAMBDA, FIT_TOLERANCE, MIN_FIT_POINTS,
};

use super::model::{BleachKind, BleachingFit, BleachingFits, FitError};

/// Fit both bleaching models to a mean-intensity signal.
///
/// Each model is fitted independently with Levenberg-Marquardt; a failure
/// in one leaves its slot empty and is recorded in `failures`, it never
/// prevents the other model from being reported.
pub fn fit(mean_intensity: &[f64], time_points: &[f64]) -> BleachingFits {
    let mut fits = BleachingFits::default();

    if let Err(e) = validate_inputs(mean_intensity, time_points) {
        debug!(error = %e, "Bleaching inputs rejected");
        for kind in BleachKind::ALL {
            fits.failures.push((kind, e.clone()));
        }
        return fits;
    }

    for kind in BleachKind::ALL {
        match fit_model(kind, mean_intensity, time_points) {
            Ok(f) => {
                debug!(
                    model = %kind,
                    a = f.params.0,
                    b = f.params.1,
                    r2 = ?f.r2,
                    "Bleaching model fitted"
                );
                match kind {
                    BleachKind::Exponential => fits.exponential = Some(f),
                    BleachKind::Inverse => fits.inverse = Some(f),
                }
            }
            Err(e) => {
                debug!(model = %kind, error = %e, "Bleaching model failed");
                fits.failures.push((kind, e));
            }
        }
    }

    fits
}

/// Fit a single model. Inputs are validated again so this is safe to call directly.
pub fn fit_model(
    kind: BleachKind,
    signal: &[f64],
    time_points: &[f64],
) -> Result<BleachingFit, FitError> {
    validate_inputs(signal, time_points)?;

    let (a0, b0) = initial_guess(kind, signal, time_points);
    let (a, b) = levenberg_marquardt(kind, signal, time_points, a0, b0)?;

    if !a.is_finite() || !b.is_finite() || b <= 0.0 {
        return Err(FitError::InvalidParameters { kind, a, b });
    }

    let predicted: Vec<f64> = time_points.iter().map(|&t| kind.evaluate(a, b, t)).collect();
    if predicted.iter().any(|v| !v.is_finite()) {
        return Err(FitError::InvalidParameters { kind, a, b });
    }

    Ok(BleachingFit {
        kind,
        params: (a, b),
        r2: r_squared(signal, &predicted),
        time_points: time_points.to_vec(),
    })
}

/// Coefficient of determination `1 - SS_res / SS_tot`.
///
/// Returns `None` when the observed signal is (numerically) constant.
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> Option<f64> {
    let n = observed.len();
    if n == 0 || n != predicted.len() {
        return None;
    }
    let mean = observed.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = observed.iter().map(|&y| (y - mean).powi(2)).sum();
    let scale: f64 = observed.iter().map(|&y| y * y).sum::<f64>().max(1.0);
    if ss_tot <= EPSILON * scale {
        return None;
    }
    let ss_res: f64 = observed
        .iter()
        .zip(predicted)
        .map(|(&y, &p)| (y - p).powi(2))
        .sum();
    let r2 = 1.0 - ss_res / ss_tot;
    r2.is_finite().then_some(r2)
}

fn validate_inputs(signal: &[f64], time_points: &[f64]) -> Result<(), FitError> {
    if signal.len() != time_points.len() {
        return Err(FitError::LengthMismatch {
            signal_len: signal.len(),
            time_len: time_points.len(),
        });
    }
    if signal.iter().chain(time_points).any(|v| !v.is_finite()) {
        return Err(FitError::NonFiniteInput);
    }

    let mut distinct = time_points.to_vec();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    if distinct.len() < MIN_FIT_POINTS {
        return Err(FitError::InsufficientData {
            expected: MIN_FIT_POINTS,
            got: distinct.len(),
        });
    }
    Ok(())
}

/// Linearize the model to seed the solver.
///
/// Exponential: `ln y = ln a - t/b`. Inverse: `1/y = 1/a + t/(a b)`.
/// Falls back to `(y[0], time span)` when the linearization is unusable
/// (non-positive samples, non-decaying slope).
fn initial_guess(kind: BleachKind, signal: &[f64], time_points: &[f64]) -> (f64, f64) {
    let t_min = time_points.iter().copied().fold(f64::INFINITY, f64::min);
    let t_max = time_points.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = (t_max - t_min).max(EPSILON);
    let fallback = (signal[0], span);

    if signal.iter().any(|&y| y <= 0.0) {
        return fallback;
    }

    let transformed: Vec<f64> = match kind {
        BleachKind::Exponential => signal.iter().map(|y| y.ln()).collect(),
        BleachKind::Inverse => signal.iter().map(|y| 1.0 / y).collect(),
    };
    let Some((slope, intercept)) = linear_regression(time_points, &transformed) else {
        return fallback;
    };

    let guess = match kind {
        BleachKind::Exponential if slope < 0.0 => (intercept.exp(), -1.0 / slope),
        BleachKind::Inverse if slope > 0.0 && intercept > 0.0 => {
            (1.0 / intercept, intercept / slope)
        }
        _ => return fallback,
    };

    if guess.0.is_finite() && guess.1.is_finite() && guess.1 > 0.0 {
        guess
    } else {
        fallback
    }
}

/// Ordinary least squares line `y = slope * x + intercept`.
fn linear_regression(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let sxx: f64 = x.iter().map(|&v| (v - mean_x).powi(2)).sum();
    if sxx <= EPSILON {
        return None;
    }
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(&xv, &yv)| (xv - mean_x) * (yv - mean_y))
        .sum();
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

fn sum_squared_residuals(kind: BleachKind, signal: &[f64], t: &[f64], a: f64, b: f64) -> f64 {
    signal
        .iter()
        .zip(t)
        .map(|(&y, &ti)| (y - kind.evaluate(a, b, ti)).powi(2))
        .sum()
}

/// Two-parameter Levenberg-Marquardt with Marquardt diagonal scaling.
///
/// Converges when an accepted step changes the residual by less than
/// `FIT_TOLERANCE` (relative), or when no damped step can improve it any
/// further (damping exceeds `FIT_MAX_LAMBDA`).
fn levenberg_marquardt(
    kind: BleachKind,
    signal: &[f64],
    t: &[f64],
    a0: f64,
    b0: f64,
) -> Result<(f64, f64), FitError> {
    let (mut a, mut b) = (a0, b0);
    let mut lambda = FIT_INITIAL_LAMBDA;
    let mut ssr = sum_squared_residuals(kind, signal, t, a, b);
    if !ssr.is_finite() {
        return Err(FitError::InvalidParameters { kind, a, b });
    }

    for _ in 0..FIT_MAX_ITERATIONS {
        if ssr == 0.0 {
            return Ok((a, b));
        }

        // Normal equations J^T J and J^T r.
        let (mut jaa, mut jab, mut jbb) = (0.0, 0.0, 0.0);
        let (mut ga, mut gb) = (0.0, 0.0);
        for (&y, &ti) in signal.iter().zip(t) {
            let (da, db) = kind.gradient(a, b, ti);
            let r = y - kind.evaluate(a, b, ti);
            jaa += da * da;
            jab += da * db;
            jbb += db * db;
            ga += da * r;
            gb += db * r;
        }

        loop {
            let m00 = jaa + lambda * jaa.max(EPSILON);
            let m11 = jbb + lambda * jbb.max(EPSILON);
            let det = m00 * m11 - jab * jab;

            if det.is_finite() && det.abs() > f64::MIN_POSITIVE {
                let step_a = (m11 * ga - jab * gb) / det;
                let step_b = (m00 * gb - jab * ga) / det;
                let (na, nb) = (a + step_a, b + step_b);

                if na.is_finite() && nb.is_finite() && nb > 0.0 {
                    let new_ssr = sum_squared_residuals(kind, signal, t, na, nb);
                    if new_ssr.is_finite() && new_ssr < ssr {
                        let improvement = ssr - new_ssr;
                        a = na;
                        b = nb;
                        ssr = new_ssr;
                        lambda = (lambda / 10.0).max(f64::MIN_POSITIVE);
                        if improvement <= FIT_TOLERANCE * (ssr + EPSILON) {
                            return Ok((a, b));
                        }
                        break;
                    }
                }
            }

            lambda *= 10.0;
            if lambda > FIT_MAX_LAMBDA {
                return Ok((a, b));
            }
        }
    }

    Err(FitError::NonConvergence {
        kind,
        iterations: FIT_MAX_ITERATIONS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_regression_exact_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let (slope, intercept) = linear_regression(&x, &y).unwrap();
        assert_relative_eq!(slope, 2.0, epsilon = 1e-12);
        assert_relative_eq!(intercept, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_regression_constant_x() {
        assert!(linear_regression(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
    }

    #[test]
    fn test_initial_guess_exact_for_clean_exponential() {
        let t: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = t.iter().map(|&ti| 80.0 * (-ti / 5.0).exp()).collect();
        let (a, b) = initial_guess(BleachKind::Exponential, &y, &t);
        assert_relative_eq!(a, 80.0, max_relative = 1e-9);
        assert_relative_eq!(b, 5.0, max_relative = 1e-9);
    }

    #[test]
    fn test_initial_guess_falls_back_on_non_positive() {
        let t = [0.0, 1.0, 2.0, 3.0];
        let y = [5.0, 0.0, -1.0, 2.0];
        let (a, b) = initial_guess(BleachKind::Inverse, &y, &t);
        assert_eq!(a, 5.0);
        assert_relative_eq!(b, 3.0);
    }

    #[test]
    fn test_r_squared_constant_signal_is_none() {
        let y = [4.0; 10];
        assert!(r_squared(&y, &y).is_none());
    }
}

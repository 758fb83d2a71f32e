mod common;

use approx::assert_relative_eq;

use caroi_core::bleaching::{fit, fit_model, select, BleachKind, FitError};
use common::{buffer, exponential_decay_frames};

fn sample_times(n: usize, dt: f64) -> Vec<f64> {
    (0..n).map(|i| i as f64 * dt).collect()
}

#[test]
fn test_exponential_recovers_parameters() {
    let t = sample_times(100, 0.1);
    let y: Vec<f64> = t.iter().map(|&t| 100.0 * (-t / 20.0).exp()).collect();

    let fits = fit(&y, &t);
    let exp = fits.exponential.as_ref().expect("exponential fit");
    assert_relative_eq!(exp.params.0, 100.0, max_relative = 0.01);
    assert_relative_eq!(exp.params.1, 20.0, max_relative = 0.01);
    assert!(exp.r2.unwrap() > 0.999);
}

#[test]
fn test_inverse_recovers_parameters() {
    let t = sample_times(100, 0.1);
    let y: Vec<f64> = t.iter().map(|&t| 100.0 / (1.0 + t / 20.0)).collect();

    let fits = fit(&y, &t);
    let inv = fits.inverse.as_ref().expect("inverse fit");
    assert_relative_eq!(inv.params.0, 100.0, max_relative = 0.01);
    assert_relative_eq!(inv.params.1, 20.0, max_relative = 0.01);
    assert!(inv.r2.unwrap() > 0.999);
}

#[test]
fn test_fits_from_frame_buffer_signal() {
    let frames = buffer(exponential_decay_frames(4, 4, 100, 10.0, 100.0, 20.0), 10.0);
    let fits = fit(&frames.mean_intensity(), &frames.time_points());
    let exp = select(BleachKind::Exponential, &fits).expect("exponential fit");
    assert_relative_eq!(exp.params.1, 20.0, max_relative = 0.01);
}

#[test]
fn test_too_few_points_gives_no_fits() {
    let fits = fit(&[10.0, 9.0], &[0.0, 1.0]);
    assert!(fits.is_empty());
    assert_eq!(fits.failures.len(), 2);
    assert!(matches!(
        fits.failures[0].1,
        FitError::InsufficientData { expected: 3, got: 2 }
    ));
}

#[test]
fn test_repeated_time_points_count_once() {
    let err = fit_model(BleachKind::Exponential, &[3.0, 2.0, 1.0], &[0.0, 0.0, 1.0]).unwrap_err();
    assert!(matches!(err, FitError::InsufficientData { got: 2, .. }));
}

#[test]
fn test_non_finite_signal_rejected() {
    let fits = fit(&[1.0, f64::NAN, 0.5, 0.25], &[0.0, 1.0, 2.0, 3.0]);
    assert!(fits.is_empty());
    assert!(fits
        .failures
        .iter()
        .all(|(_, e)| *e == FitError::NonFiniteInput));
}

#[test]
fn test_constant_signal_has_no_r2() {
    let t = sample_times(20, 1.0);
    let y = vec![5.0; 20];
    let fits = fit(&y, &t);
    for kind in BleachKind::ALL {
        if let Some(f) = fits.get(kind) {
            assert!(f.r2.is_none(), "{kind} reported R² for a flat signal");
            assert!(f.params.0.is_finite() && f.params.1.is_finite());
        }
    }
}

#[test]
fn test_fit_curve_matches_evaluate() {
    let t = sample_times(30, 0.5);
    let y: Vec<f64> = t.iter().map(|&t| 50.0 * (-t / 8.0).exp()).collect();
    let fits = fit(&y, &t);
    let exp = fits.exponential.unwrap();
    let curve = exp.curve();
    assert_eq!(curve.len(), t.len());
    assert_relative_eq!(curve[5], exp.evaluate(t[5]), epsilon = 1e-12);
}

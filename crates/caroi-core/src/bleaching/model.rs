use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Photobleaching decay model family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BleachKind {
    /// `I(t) = a * exp(-t / b)`
    #[default]
    Exponential,
    /// `I(t) = a / (1 + t / b)`
    Inverse,
}

impl BleachKind {
    pub const ALL: [BleachKind; 2] = [BleachKind::Exponential, BleachKind::Inverse];

    /// Evaluate the model at time `t` with parameters `(a, b)`.
    pub fn evaluate(self, a: f64, b: f64, t: f64) -> f64 {
        match self {
            Self::Exponential => a * (-t / b).exp(),
            Self::Inverse => a / (1.0 + t / b),
        }
    }

    /// Partial derivatives `(df/da, df/db)` at time `t`.
    pub(crate) fn gradient(self, a: f64, b: f64, t: f64) -> (f64, f64) {
        match self {
            Self::Exponential => {
                let e = (-t / b).exp();
                (e, a * e * t / (b * b))
            }
            Self::Inverse => {
                let denom = 1.0 + t / b;
                (1.0 / denom, a * t / (b * b * denom * denom))
            }
        }
    }
}

impl std::fmt::Display for BleachKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exponential => write!(f, "Exponential"),
            Self::Inverse => write!(f, "Inverse"),
        }
    }
}

/// A fitted bleaching curve. Immutable; a new fit produces a new value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BleachingFit {
    pub kind: BleachKind,
    /// Amplitude `a` and time constant `b` (seconds).
    pub params: (f64, f64),
    /// Coefficient of determination; `None` when the signal is (near) constant.
    pub r2: Option<f64>,
    pub time_points: Vec<f64>,
}

impl BleachingFit {
    pub fn evaluate(&self, t: f64) -> f64 {
        self.kind.evaluate(self.params.0, self.params.1, t)
    }

    /// Fitted curve sampled at the fit's own time points.
    pub fn curve(&self) -> Vec<f64> {
        self.time_points.iter().map(|&t| self.evaluate(t)).collect()
    }
}

/// Outcome of fitting both models to one signal. Either slot may be empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BleachingFits {
    pub exponential: Option<BleachingFit>,
    pub inverse: Option<BleachingFit>,
    /// Why a model slot is empty.
    #[serde(skip)]
    pub failures: Vec<(BleachKind, FitError)>,
}

impl BleachingFits {
    pub fn get(&self, kind: BleachKind) -> Option<&BleachingFit> {
        match kind {
            BleachKind::Exponential => self.exponential.as_ref(),
            BleachKind::Inverse => self.inverse.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exponential.is_none() && self.inverse.is_none()
    }
}

/// Return the fit matching the caller's preference, if that model converged.
pub fn select(preference: BleachKind, fits: &BleachingFits) -> Option<&BleachingFit> {
    fits.get(preference)
}

/// Reasons a single bleaching model could not be fitted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("insufficient data: expected at least {expected} distinct time points, got {got}")]
    InsufficientData { expected: usize, got: usize },

    #[error("length mismatch: signal has {signal_len} points, time has {time_len}")]
    LengthMismatch { signal_len: usize, time_len: usize },

    #[error("signal contains non-finite values")]
    NonFiniteInput,

    #[error("{kind} fit did not converge after {iterations} iterations")]
    NonConvergence { kind: BleachKind, iterations: usize },

    #[error("{kind} fit produced invalid parameters a={a}, b={b}")]
    InvalidParameters { kind: BleachKind, a: f64, b: f64 },
}

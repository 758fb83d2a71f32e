pub mod model;
pub mod solver;

pub use model::{select, BleachKind, BleachingFit, BleachingFits, FitError};
pub use solver::{fit, fit_model, r_squared};

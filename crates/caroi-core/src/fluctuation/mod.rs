pub mod detrend;
pub mod map;

pub use map::{compute_fluctuation_map, percentile, FluctuationMap};

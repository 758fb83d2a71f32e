pub mod cache;
pub mod coords;
pub mod trace;

use serde::{Deserialize, Serialize};

pub use cache::{TraceCache, TraceKey};
pub use coords::RoiCoords;
pub use trace::{correct, extract_trace, raw_trace, smooth, IntensityTrace, TraceSettings};

/// Session-unique ROI identifier. Assigned from 1 upward, never reused.
pub type RoiId = u64;

/// How an ROI came into existence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoiOrigin {
    #[default]
    Drawn,
    Auto,
}

/// A registered region of interest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub id: RoiId,
    pub coords: RoiCoords,
    pub selected: bool,
    #[serde(default)]
    pub origin: RoiOrigin,
    /// Similarity group assigned by auto-detection clustering.
    #[serde(default)]
    pub cluster: Option<usize>,
}

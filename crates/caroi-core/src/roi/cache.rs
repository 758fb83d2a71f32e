use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bleaching::BleachKind;
use crate::error::Result;

use super::coords::RoiCoords;
use super::trace::{IntensityTrace, TraceSettings};
use super::RoiId;

/// Fingerprint of a computed trace: the ROI, its geometry and every setting
/// that influences post-processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceKey {
    pub roi_id: RoiId,
    pub coords: RoiCoords,
    pub fit_kind: BleachKind,
    pub adjust_bleaching: bool,
    alpha_bits: u64,
}

impl TraceKey {
    pub fn new(roi_id: RoiId, coords: RoiCoords, settings: &TraceSettings) -> Self {
        // -0.0 and 0.0 must hash the same.
        let alpha = if settings.smoothing_alpha == 0.0 {
            0.0
        } else {
            settings.smoothing_alpha
        };
        Self {
            roi_id,
            coords,
            fit_kind: settings.fit_kind,
            adjust_bleaching: settings.adjust_bleaching,
            alpha_bits: alpha.to_bits(),
        }
    }

    pub fn smoothing_alpha(&self) -> f64 {
        f64::from_bits(self.alpha_bits)
    }
}

/// Memoized traces for the current recording and fit.
///
/// Raw traces only depend on the frames and the rectangle, so they are kept
/// separately and shared by every post-processing variant of the same ROI.
#[derive(Debug, Default)]
pub struct TraceCache {
    traces: HashMap<TraceKey, Arc<IntensityTrace>>,
    raw: HashMap<(RoiId, RoiCoords), Arc<Vec<f64>>>,
    hits: u64,
    misses: u64,
}

impl TraceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TraceKey) -> Option<Arc<IntensityTrace>> {
        self.traces.get(key).cloned()
    }

    /// Return the cached trace for `key`, running `compute` only on a miss.
    pub fn get_or_compute<F>(&mut self, key: TraceKey, compute: F) -> Result<Arc<IntensityTrace>>
    where
        F: FnOnce(Option<Arc<Vec<f64>>>) -> Result<IntensityTrace>,
    {
        if let Some(hit) = self.traces.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(hit));
        }
        self.misses += 1;

        let raw = self.raw.get(&(key.roi_id, key.coords)).cloned();
        let trace = Arc::new(compute(raw)?);
        self.insert(key, Arc::clone(&trace));
        Ok(trace)
    }

    /// Counting lookup for callers that batch their misses.
    pub fn lookup(&mut self, key: &TraceKey) -> Option<Arc<IntensityTrace>> {
        match self.traces.get(key) {
            Some(hit) => {
                self.hits += 1;
                Some(Arc::clone(hit))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Raw measurement shared by all variants of `roi_id` at `coords`.
    pub fn raw(&self, roi_id: RoiId, coords: RoiCoords) -> Option<Arc<Vec<f64>>> {
        self.raw.get(&(roi_id, coords)).cloned()
    }

    /// Seed a raw measurement computed elsewhere (auto-detection).
    pub fn insert_raw(&mut self, roi_id: RoiId, coords: RoiCoords, raw: Vec<f64>) {
        self.raw.insert((roi_id, coords), Arc::new(raw));
    }

    pub fn insert(&mut self, key: TraceKey, trace: Arc<IntensityTrace>) {
        self.raw
            .entry((key.roi_id, key.coords))
            .or_insert_with(|| Arc::new(trace.raw.clone()));
        self.traces.insert(key, trace);
    }

    /// Drop everything cached for one ROI. Returns the number of traces removed.
    pub fn invalidate_roi(&mut self, roi_id: RoiId) -> usize {
        let before = self.traces.len();
        self.traces.retain(|k, _| k.roi_id != roi_id);
        self.raw.retain(|(id, _), _| *id != roi_id);
        let removed = before - self.traces.len();
        debug!(roi_id, removed, "Invalidated ROI traces");
        removed
    }

    /// Drop post-processed traces but keep raw measurements (fit changed).
    pub fn invalidate_processed(&mut self) -> usize {
        let removed = self.traces.len();
        self.traces.clear();
        removed
    }

    /// Drop everything (frames changed).
    pub fn clear(&mut self) -> usize {
        let removed = self.traces.len();
        self.traces.clear();
        self.raw.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

use std::collections::BTreeMap;

use crate::error::{CaroiError, Result};
use crate::roi::{Roi, RoiCoords, RoiId, RoiOrigin};

/// ROI registry with session-unique ids.
///
/// Ids start at 1 and only ever grow; removing or clearing ROIs never makes
/// an id available again.
#[derive(Debug)]
pub struct RoiRegistry {
    rois: BTreeMap<RoiId, Roi>,
    next_id: RoiId,
}

impl Default for RoiRegistry {
    fn default() -> Self {
        Self {
            rois: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl RoiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new ROI, selected by default.
    pub fn insert(&mut self, coords: RoiCoords, origin: RoiOrigin, cluster: Option<usize>) -> Roi {
        let id = self.next_id;
        self.next_id += 1;
        let roi = Roi {
            id,
            coords,
            selected: true,
            origin,
            cluster,
        };
        self.rois.insert(id, roi.clone());
        roi
    }

    pub fn get(&self, id: RoiId) -> Result<&Roi> {
        self.rois.get(&id).ok_or(CaroiError::UnknownRoi(id))
    }

    pub fn get_mut(&mut self, id: RoiId) -> Result<&mut Roi> {
        self.rois.get_mut(&id).ok_or(CaroiError::UnknownRoi(id))
    }

    pub fn remove(&mut self, id: RoiId) -> Result<Roi> {
        self.rois.remove(&id).ok_or(CaroiError::UnknownRoi(id))
    }

    /// All ROIs ordered by id.
    pub fn list(&self) -> Vec<Roi> {
        self.rois.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<RoiId> {
        self.rois.keys().copied().collect()
    }

    /// Remove every ROI for which `keep` returns false; returns the removed ids.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<RoiId>
    where
        F: FnMut(&Roi) -> bool,
    {
        let dropped: Vec<RoiId> = self
            .rois
            .values()
            .filter(|r| !keep(r))
            .map(|r| r.id)
            .collect();
        for id in &dropped {
            self.rois.remove(id);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    /// Id the next inserted ROI will receive.
    pub fn next_id(&self) -> RoiId {
        self.next_id
    }
}

pub mod config;
pub mod events;
pub mod registry;
pub mod worker;

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::bleaching::{self, select, BleachKind, BleachingFit, BleachingFits};
use crate::consts::PARALLEL_ROI_THRESHOLD;
use crate::detection::{detect_rois, AutoRoiConfig, AutoRoiResult};
use crate::error::{CaroiError, Result};
use crate::fluctuation::{compute_fluctuation_map, FluctuationMap};
use crate::frame::{FrameBuffer, VideoSummary};
use crate::roi::trace::process_trace;
use crate::roi::{
    raw_trace, IntensityTrace, Roi, RoiCoords, RoiId, RoiOrigin, TraceCache, TraceKey,
    TraceSettings,
};

pub use config::{AutoRoiConfigPatch, RoiRetention, SessionConfig, SessionConfigPatch};
pub use events::{EventLog, JobKind, SessionEvent, SessionObserver};
pub use registry::RoiRegistry;
pub use worker::{SessionWorker, WorkerCommand, WorkerResult};

/// A value computed against one specific recording.
#[derive(Clone, Debug)]
pub struct Tagged<T> {
    /// Epoch of the recording the value was computed from.
    pub epoch: u64,
    pub value: T,
}

/// Immutable view of the current recording, safe to hand to worker threads.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub epoch: u64,
    pub frames: Arc<FrameBuffer>,
}

impl SessionSnapshot {
    pub fn compute_bleaching(&self) -> Tagged<BleachingFits> {
        let fits = bleaching::fit(&self.frames.mean_intensity(), &self.frames.time_points());
        self.tag(fits)
    }

    pub fn compute_fluctuation(&self) -> Tagged<Arc<FluctuationMap>> {
        self.tag(Arc::new(compute_fluctuation_map(&self.frames)))
    }

    pub fn compute_auto_roi(
        &self,
        map: &FluctuationMap,
        config: &AutoRoiConfig,
    ) -> Result<Tagged<AutoRoiResult>> {
        Ok(self.tag(detect_rois(map, &self.frames, config)?))
    }

    fn tag<T>(&self, value: T) -> Tagged<T> {
        Tagged {
            epoch: self.epoch,
            value,
        }
    }
}

/// Both bleaching fits plus the model currently used for correction.
#[derive(Clone, Debug)]
pub struct BleachingReport {
    pub fits: BleachingFits,
    pub preferred: BleachKind,
}

impl BleachingReport {
    pub fn preferred_fit(&self) -> Option<&BleachingFit> {
        select(self.preferred, &self.fits)
    }
}

/// Registered ROIs of an auto-detection run together with the detector output.
#[derive(Clone, Debug)]
pub struct AutoRoiRun {
    pub rois: Vec<Roi>,
    pub result: AutoRoiResult,
}

/// Owns one recording and everything derived from it: bleaching fits, the
/// fluctuation map, the ROI registry and the trace cache.
///
/// Loading a recording bumps the session epoch. Results computed against an
/// older epoch are rejected by the `commit_*` methods, so a slow job can never
/// overwrite state belonging to a newer recording.
pub struct AnalysisSession {
    config: SessionConfig,
    frames: Option<Arc<FrameBuffer>>,
    epoch: u64,
    fits: Option<BleachingFits>,
    fluctuation: Option<Arc<FluctuationMap>>,
    registry: RoiRegistry,
    cache: TraceCache,
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self::from_valid_config(SessionConfig::default())
    }
}

impl AnalysisSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: SessionConfig) -> Self {
        Self {
            config,
            frames: None,
            epoch: 0,
            fits: None,
            fluctuation: None,
            registry: RoiRegistry::new(),
            cache: TraceCache::new(),
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Merge a partial configuration update. Nothing changes on error.
    pub fn update_config(&mut self, patch: &SessionConfigPatch) -> Result<&SessionConfig> {
        let merged = self.config.merge(patch)?;
        let preference_changed = merged.fit_preference != self.config.fit_preference;
        let settings_changed = merged.trace_settings() != self.config.trace_settings();
        self.config = merged;

        if preference_changed {
            self.emit(SessionEvent::FitPreferenceChanged {
                kind: self.config.fit_preference,
            });
        }
        if settings_changed {
            self.emit(SessionEvent::TracesInvalidated {
                roi_ids: self.registry.ids(),
            });
        }
        Ok(&self.config)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn has_video(&self) -> bool {
        self.frames.is_some()
    }

    pub fn frames(&self) -> Result<&Arc<FrameBuffer>> {
        self.frames.as_ref().ok_or(CaroiError::NoVideoLoaded)
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        Ok(SessionSnapshot {
            epoch: self.epoch,
            frames: Arc::clone(self.frames()?),
        })
    }

    // ---- Recording ----

    /// Replace the current recording.
    ///
    /// Fits, the fluctuation map and every cached trace are discarded. ROIs
    /// follow the configured [`RoiRetention`] policy.
    pub fn load_video(&mut self, frames: FrameBuffer) -> VideoSummary {
        let summary = frames.summary();
        let (width, height) = (frames.width(), frames.height());

        self.epoch += 1;
        self.frames = Some(Arc::new(frames));
        self.fits = None;
        self.fluctuation = None;
        self.cache.clear();

        let dropped_rois = match self.config.roi_retention {
            RoiRetention::Clear => self.registry.retain(|_| false),
            RoiRetention::Retain => self
                .registry
                .retain(|r| r.coords.validate(width, height).is_ok()),
        };

        info!(
            epoch = self.epoch,
            frames = summary.frame_count,
            width,
            height,
            fps = summary.fps,
            retained_rois = self.registry.len(),
            dropped_rois = dropped_rois.len(),
            "Video loaded"
        );

        self.emit(SessionEvent::VideoLoaded {
            epoch: self.epoch,
            summary: summary.clone(),
            dropped_rois,
        });
        summary
    }

    /// Validate raw frame arrays and load them. On error nothing is committed.
    pub fn load_arrays(&mut self, arrays: Vec<ndarray::Array2<f32>>, fps: f64) -> Result<VideoSummary> {
        let frames = FrameBuffer::from_arrays(arrays, fps)?;
        Ok(self.load_video(frames))
    }

    // ---- Bleaching ----

    pub fn run_bleaching_fit(&mut self) -> Result<BleachingReport> {
        let tagged = self.snapshot()?.compute_bleaching();
        self.commit_bleaching(tagged)
    }

    /// Install fits computed from a snapshot.
    pub fn commit_bleaching(&mut self, tagged: Tagged<BleachingFits>) -> Result<BleachingReport> {
        self.check_epoch(JobKind::Bleaching, tagged.epoch)?;
        let fits = tagged.value;

        for (kind, err) in &fits.failures {
            warn!(%kind, error = %err, "Bleaching model not fitted");
        }
        self.emit(SessionEvent::FitUpdated {
            epoch: self.epoch,
            exponential: fits.exponential.is_some(),
            inverse: fits.inverse.is_some(),
        });

        self.fits = Some(fits.clone());
        if self.cache.invalidate_processed() > 0 {
            self.emit(SessionEvent::TracesInvalidated {
                roi_ids: self.registry.ids(),
            });
        }

        Ok(BleachingReport {
            fits,
            preferred: self.config.fit_preference,
        })
    }

    pub fn bleaching_fits(&self) -> Option<&BleachingFits> {
        self.fits.as_ref()
    }

    /// Fit of the preferred model, if it has been computed and converged.
    pub fn preferred_fit(&self) -> Option<&BleachingFit> {
        self.fits
            .as_ref()
            .and_then(|f| select(self.config.fit_preference, f))
    }

    /// Switch the model used for correction. Traces are recomputed lazily on
    /// the next query; observers are told every ROI's trace changed.
    pub fn set_fit_preference(&mut self, kind: BleachKind) {
        if self.config.fit_preference == kind {
            return;
        }
        self.config.fit_preference = kind;
        debug!(%kind, "Fit preference changed");
        self.emit(SessionEvent::FitPreferenceChanged { kind });
        self.emit(SessionEvent::TracesInvalidated {
            roi_ids: self.registry.ids(),
        });
    }

    // ---- Fluctuation map ----

    /// Compute the fluctuation map, or return the cached one.
    pub fn run_fluctuation_map(&mut self) -> Result<Arc<FluctuationMap>> {
        if let Some(map) = &self.fluctuation {
            return Ok(Arc::clone(map));
        }
        let tagged = self.snapshot()?.compute_fluctuation();
        self.commit_fluctuation(tagged)
    }

    pub fn commit_fluctuation(
        &mut self,
        tagged: Tagged<Arc<FluctuationMap>>,
    ) -> Result<Arc<FluctuationMap>> {
        self.check_epoch(JobKind::Fluctuation, tagged.epoch)?;
        self.fluctuation = Some(Arc::clone(&tagged.value));
        self.emit(SessionEvent::FluctuationMapReady { epoch: self.epoch });
        Ok(tagged.value)
    }

    pub fn fluctuation_map(&self) -> Option<Arc<FluctuationMap>> {
        self.fluctuation.clone()
    }

    // ---- Auto-ROI ----

    /// Detect ROIs on the fluctuation map (computed on demand) and register
    /// them. `None` uses the session's auto-ROI configuration.
    pub fn run_auto_roi(&mut self, config: Option<&AutoRoiConfig>) -> Result<AutoRoiRun> {
        let config = config
            .cloned()
            .unwrap_or_else(|| self.config.auto_roi.clone());
        let map = self.run_fluctuation_map()?;
        let tagged = self.snapshot()?.compute_auto_roi(&map, &config)?;
        self.commit_auto_roi(tagged)
    }

    /// Register the candidates of a detection run. Their average traces seed
    /// the raw trace cache.
    pub fn commit_auto_roi(&mut self, tagged: Tagged<AutoRoiResult>) -> Result<AutoRoiRun> {
        self.check_epoch(JobKind::AutoRoi, tagged.epoch)?;
        let result = tagged.value;

        let mut rois = Vec::with_capacity(result.candidates.len());
        for cand in &result.candidates {
            let roi = self
                .registry
                .insert(cand.coords, RoiOrigin::Auto, cand.cluster);
            self.cache
                .insert_raw(roi.id, roi.coords, cand.average_trace.clone());
            self.emit(SessionEvent::RoiCreated { id: roi.id });
            rois.push(roi);
        }

        info!(
            registered = rois.len(),
            total_rois = self.registry.len(),
            "Auto-detected ROIs registered"
        );
        Ok(AutoRoiRun { rois, result })
    }

    // ---- ROI registry ----

    /// Register an ROI using the session's default trace settings.
    pub fn create_roi(&mut self, coords: RoiCoords) -> Result<Roi> {
        let settings = self.config.trace_settings();
        let (roi, _) = self.create_roi_with(coords, settings)?;
        Ok(roi)
    }

    /// Register an ROI and compute its initial trace with explicit settings.
    ///
    /// The rectangle must already be normalized and lie inside the frame;
    /// use [`RoiCoords::from_corners`] for raw drawing input.
    pub fn create_roi_with(
        &mut self,
        coords: RoiCoords,
        settings: TraceSettings,
    ) -> Result<(Roi, Arc<IntensityTrace>)> {
        let frames = self.frames()?;
        coords.validate(frames.width(), frames.height())?;
        check_alpha(settings.smoothing_alpha)?;

        let roi = self.registry.insert(coords, RoiOrigin::Drawn, None);
        let trace = match self.trace_with(roi.id, settings) {
            Ok(trace) => trace,
            Err(e) => {
                let _ = self.registry.remove(roi.id);
                return Err(e);
            }
        };

        debug!(roi_id = roi.id, coords = %coords, "ROI created");
        self.emit(SessionEvent::RoiCreated { id: roi.id });
        Ok((roi, trace))
    }

    pub fn set_selected(&mut self, id: RoiId, selected: bool) -> Result<()> {
        let roi = self.registry.get_mut(id)?;
        if roi.selected != selected {
            roi.selected = selected;
            self.emit(SessionEvent::RoiSelectionChanged { id, selected });
        }
        Ok(())
    }

    pub fn remove_roi(&mut self, id: RoiId) -> Result<Roi> {
        let roi = self.registry.remove(id)?;
        self.cache.invalidate_roi(id);
        self.emit(SessionEvent::RoiRemoved { id });
        Ok(roi)
    }

    /// Move or resize an ROI. Its cached traces become stale.
    pub fn update_roi_coords(&mut self, id: RoiId, coords: RoiCoords) -> Result<Roi> {
        let frames = self.frames()?;
        coords.validate(frames.width(), frames.height())?;

        let roi = self.registry.get_mut(id)?;
        if roi.coords == coords {
            return Ok(roi.clone());
        }
        roi.coords = coords;
        let updated = roi.clone();

        self.cache.invalidate_roi(id);
        self.emit(SessionEvent::TracesInvalidated { roi_ids: vec![id] });
        Ok(updated)
    }

    /// Remove every ROI. Ids keep counting up.
    pub fn clear_rois(&mut self) -> Vec<RoiId> {
        let removed = self.registry.retain(|_| false);
        for &id in &removed {
            self.cache.invalidate_roi(id);
            self.emit(SessionEvent::RoiRemoved { id });
        }
        removed
    }

    pub fn roi(&self, id: RoiId) -> Result<&Roi> {
        self.registry.get(id)
    }

    /// All ROIs ordered by id.
    pub fn list_rois(&self) -> Vec<Roi> {
        self.registry.list()
    }

    pub fn selected_ids(&self) -> Vec<RoiId> {
        self.registry
            .list()
            .into_iter()
            .filter(|r| r.selected)
            .map(|r| r.id)
            .collect()
    }

    // ---- Traces ----

    /// Trace of one ROI with the session's default settings.
    pub fn trace(&mut self, id: RoiId) -> Result<Arc<IntensityTrace>> {
        let settings = self.config.trace_settings();
        self.trace_with(id, settings)
    }

    pub fn trace_with(&mut self, id: RoiId, settings: TraceSettings) -> Result<Arc<IntensityTrace>> {
        let frames = Arc::clone(self.frames()?);
        let coords = self.registry.get(id)?.coords;
        let fit = self.fits.as_ref().and_then(|f| f.get(settings.fit_kind));
        let key = TraceKey::new(id, coords, &settings);

        self.cache.get_or_compute(key, |raw| {
            let raw = match raw {
                Some(raw) => Vec::clone(&raw),
                None => raw_trace(&frames, &coords)?,
            };
            process_trace(&frames, raw, id, &coords, fit, &settings)
        })
    }

    /// Traces of several ROIs smoothed with `alpha`, in request order.
    ///
    /// Cache misses are computed in parallel.
    pub fn traces(&mut self, ids: &[RoiId], alpha: f64) -> Result<Vec<(RoiId, Arc<IntensityTrace>)>> {
        check_alpha(alpha)?;
        let frames = Arc::clone(self.frames()?);
        let settings = TraceSettings {
            smoothing_alpha: alpha,
            ..self.config.trace_settings()
        };
        let fit = self.fits.as_ref().and_then(|f| f.get(settings.fit_kind));

        let mut found: Vec<Option<Arc<IntensityTrace>>> = Vec::with_capacity(ids.len());
        let mut pending = Vec::new();
        for (slot, &id) in ids.iter().enumerate() {
            let coords = self.registry.get(id)?.coords;
            let key = TraceKey::new(id, coords, &settings);
            match self.cache.lookup(&key) {
                Some(trace) => found.push(Some(trace)),
                None => {
                    found.push(None);
                    pending.push((slot, id, coords, self.cache.raw(id, coords)));
                }
            }
        }

        let compute = |(slot, id, coords, raw): &(usize, RoiId, RoiCoords, Option<Arc<Vec<f64>>>)| {
            let raw = match raw {
                Some(raw) => Vec::clone(raw),
                None => raw_trace(&frames, coords)?,
            };
            process_trace(&frames, raw, *id, coords, fit, &settings).map(|t| (*slot, t))
        };
        let computed: Vec<(usize, IntensityTrace)> = if pending.len() >= PARALLEL_ROI_THRESHOLD {
            pending.par_iter().map(compute).collect::<Result<_>>()?
        } else {
            pending.iter().map(compute).collect::<Result<_>>()?
        };

        debug!(
            requested = ids.len(),
            computed = computed.len(),
            "Trace batch resolved"
        );

        for (slot, trace) in computed {
            let trace = Arc::new(trace);
            self.cache.insert(trace.key, Arc::clone(&trace));
            found[slot] = Some(trace);
        }

        Ok(ids.iter().copied().zip(found.into_iter().flatten()).collect())
    }

    /// Traces of every selected ROI with the default smoothing.
    pub fn selected_traces(&mut self) -> Result<Vec<(RoiId, Arc<IntensityTrace>)>> {
        let ids = self.selected_ids();
        let alpha = self.config.smoothing_alpha;
        self.traces(&ids, alpha)
    }

    pub fn cache(&self) -> &TraceCache {
        &self.cache
    }

    fn check_epoch(&self, job: JobKind, result_epoch: u64) -> Result<()> {
        if result_epoch == self.epoch {
            return Ok(());
        }
        warn!(
            %job,
            result_epoch,
            current_epoch = self.epoch,
            "Discarding result computed for a previous recording"
        );
        self.emit(SessionEvent::StaleResultDiscarded {
            job,
            result_epoch,
            current_epoch: self.epoch,
        });
        Err(CaroiError::StaleResult {
            result_epoch,
            current_epoch: self.epoch,
        })
    }

    fn emit(&self, event: SessionEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

fn check_alpha(alpha: f64) -> Result<()> {
    if (0.0..=1.0).contains(&alpha) {
        Ok(())
    } else {
        Err(CaroiError::InvalidParameter(format!(
            "smoothing alpha must be in [0, 1], got {alpha}"
        )))
    }
}

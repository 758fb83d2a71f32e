mod common;

use std::sync::Arc;

use caroi_core::bleaching::BleachKind;
use caroi_core::detection::AutoRoiConfig;
use caroi_core::error::CaroiError;
use caroi_core::roi::{RoiCoords, RoiOrigin, TraceSettings};
use caroi_core::session::{
    AnalysisSession, EventLog, RoiRetention, SessionConfig, SessionConfigPatch, SessionEvent,
};
use common::{blinking_square_frames, buffer, exponential_decay_frames, random_frames};

fn session_with_video() -> AnalysisSession {
    let mut session = AnalysisSession::default();
    session.load_video(buffer(random_frames(16, 16, 12, 7), 10.0));
    session
}

#[test]
fn test_ids_increase_and_are_never_reused() {
    let mut session = session_with_video();
    let c = RoiCoords::new(0, 0, 4, 4);
    let ids: Vec<_> = (0..3).map(|_| session.create_roi(c).unwrap().id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    session.remove_roi(2).unwrap();
    assert_eq!(session.create_roi(c).unwrap().id, 4);
    let listed: Vec<_> = session.list_rois().iter().map(|r| r.id).collect();
    assert_eq!(listed, vec![1, 3, 4]);
}

#[test]
fn test_new_roi_is_selected_and_toggles() {
    let mut session = session_with_video();
    let roi = session.create_roi(RoiCoords::new(2, 2, 6, 6)).unwrap();
    assert!(roi.selected);
    assert_eq!(roi.origin, RoiOrigin::Drawn);

    session.set_selected(roi.id, false).unwrap();
    assert!(!session.roi(roi.id).unwrap().selected);
    assert!(session.selected_ids().is_empty());
}

#[test]
fn test_operations_on_unknown_roi_fail() {
    let mut session = session_with_video();
    assert!(matches!(session.remove_roi(9), Err(CaroiError::UnknownRoi(9))));
    assert!(matches!(
        session.set_selected(9, true),
        Err(CaroiError::UnknownRoi(9))
    ));
    assert!(matches!(session.trace(9), Err(CaroiError::UnknownRoi(9))));
}

#[test]
fn test_invalid_rectangles_rejected() {
    let mut session = session_with_video();
    assert!(matches!(
        session.create_roi(RoiCoords::new(4, 4, 4, 8)),
        Err(CaroiError::InvalidRoi(_))
    ));
    assert!(matches!(
        session.create_roi(RoiCoords::new(0, 0, 17, 4)),
        Err(CaroiError::InvalidRoi(_))
    ));
    // Nothing was registered, so the next id is still 1.
    assert_eq!(session.create_roi(RoiCoords::new(0, 0, 2, 2)).unwrap().id, 1);
}

#[test]
fn test_operations_without_video() {
    let mut session = AnalysisSession::default();
    assert!(matches!(
        session.create_roi(RoiCoords::new(0, 0, 1, 1)),
        Err(CaroiError::NoVideoLoaded)
    ));
    assert!(matches!(
        session.run_bleaching_fit(),
        Err(CaroiError::NoVideoLoaded)
    ));
    assert!(matches!(
        session.run_fluctuation_map(),
        Err(CaroiError::NoVideoLoaded)
    ));
}

#[test]
fn test_failed_load_commits_nothing() {
    let mut session = session_with_video();
    let epoch = session.epoch();
    assert!(session.load_arrays(Vec::new(), 10.0).is_err());
    assert_eq!(session.epoch(), epoch);
    assert!(session.has_video());
}

#[test]
fn test_trace_cache_hits_and_misses() {
    let mut session = session_with_video();
    let roi = session.create_roi(RoiCoords::new(0, 0, 8, 8)).unwrap();
    let misses = session.cache().misses();

    let a = session.trace(roi.id).unwrap();
    let b = session.trace(roi.id).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(session.cache().misses(), misses);
    assert!(session.cache().hits() >= 2);

    // Different smoothing is a different fingerprint.
    let smoothed = session.traces(&[roi.id], 0.5).unwrap();
    assert_eq!(session.cache().misses(), misses + 1);
    assert_eq!(smoothed[0].1.raw, a.raw);
    assert_ne!(smoothed[0].1.smoothed, a.smoothed);
}

#[test]
fn test_moving_roi_invalidates_its_trace() {
    let mut session = session_with_video();
    let roi = session.create_roi(RoiCoords::new(0, 0, 4, 4)).unwrap();
    let before = session.trace(roi.id).unwrap();

    session
        .update_roi_coords(roi.id, RoiCoords::new(8, 8, 12, 12))
        .unwrap();
    let after = session.trace(roi.id).unwrap();
    assert_ne!(before.raw, after.raw);
    assert_eq!(after.key.coords, RoiCoords::new(8, 8, 12, 12));
}

#[test]
fn test_traces_batch_preserves_request_order() {
    let mut session = session_with_video();
    for i in 0..6 {
        session
            .create_roi(RoiCoords::new(i, i, i + 3, i + 3))
            .unwrap();
    }
    let ids = [5, 2, 6, 1, 3, 4];
    let traces = session.traces(&ids, 0.2).unwrap();
    let got: Vec<_> = traces.iter().map(|(id, _)| *id).collect();
    assert_eq!(got, ids);
    for (id, trace) in &traces {
        assert_eq!(trace.key.roi_id, *id);
    }
}

#[test]
fn test_bleaching_fit_drives_correction() {
    let mut session = AnalysisSession::default();
    session.load_video(buffer(exponential_decay_frames(8, 8, 60, 10.0, 100.0, 3.0), 10.0));
    let roi = session.create_roi(RoiCoords::new(0, 0, 4, 4)).unwrap();
    let uncorrected = session.trace(roi.id).unwrap();
    assert_eq!(uncorrected.corrected, uncorrected.raw);

    let report = session.run_bleaching_fit().unwrap();
    assert_eq!(report.preferred, BleachKind::Exponential);
    assert!(report.preferred_fit().is_some());

    let corrected = session.trace(roi.id).unwrap();
    let first = corrected.corrected[0];
    let last = *corrected.corrected.last().unwrap();
    assert!((first - last).abs() / first < 1e-3);

    session.set_fit_preference(BleachKind::Inverse);
    let inverse = session.trace(roi.id).unwrap();
    assert_eq!(inverse.key.fit_kind, BleachKind::Inverse);
}

#[test]
fn test_create_roi_with_explicit_settings() {
    let mut session = session_with_video();
    let settings = TraceSettings {
        fit_kind: BleachKind::Inverse,
        adjust_bleaching: false,
        smoothing_alpha: 0.4,
    };
    let (roi, trace) = session
        .create_roi_with(RoiCoords::new(0, 0, 5, 5), settings)
        .unwrap();
    assert_eq!(trace.key.roi_id, roi.id);
    assert_eq!(trace.key.smoothing_alpha(), 0.4);
    assert_eq!(trace.corrected, trace.raw);

    let bad = TraceSettings {
        smoothing_alpha: 1.5,
        ..settings
    };
    assert!(matches!(
        session.create_roi_with(RoiCoords::new(0, 0, 5, 5), bad),
        Err(CaroiError::InvalidParameter(_))
    ));
}

#[test]
fn test_stale_results_are_rejected() {
    let log = Arc::new(EventLog::new());
    let mut session = session_with_video();
    session.add_observer(log.clone());

    let snapshot = session.snapshot().unwrap();
    let fits = snapshot.compute_bleaching();
    let map = snapshot.compute_fluctuation();

    session.load_video(buffer(random_frames(16, 16, 12, 99), 10.0));
    assert!(matches!(
        session.commit_bleaching(fits),
        Err(CaroiError::StaleResult { result_epoch: 1, current_epoch: 2 })
    ));
    assert!(session.commit_fluctuation(map).is_err());
    assert!(session.bleaching_fits().is_none());
    assert!(session.fluctuation_map().is_none());

    let stale = log
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::StaleResultDiscarded { .. }))
        .count();
    assert_eq!(stale, 2);
}

#[test]
fn test_video_switch_retains_fitting_rois() {
    let mut session = AnalysisSession::default();
    session.load_video(buffer(random_frames(20, 20, 5, 1), 10.0));
    let small = session.create_roi(RoiCoords::new(0, 0, 5, 5)).unwrap();
    let large = session.create_roi(RoiCoords::new(10, 10, 20, 20)).unwrap();

    session.load_video(buffer(random_frames(12, 12, 5, 2), 10.0));
    let ids: Vec<_> = session.list_rois().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![small.id]);
    assert!(session.roi(large.id).is_err());
    assert_eq!(session.epoch(), 2);
}

#[test]
fn test_video_switch_clear_policy() {
    let config = SessionConfig {
        roi_retention: RoiRetention::Clear,
        ..Default::default()
    };
    let mut session = AnalysisSession::new(config).unwrap();
    session.load_video(buffer(random_frames(8, 8, 4, 1), 10.0));
    session.create_roi(RoiCoords::new(0, 0, 2, 2)).unwrap();

    session.load_video(buffer(random_frames(8, 8, 4, 2), 10.0));
    assert!(session.list_rois().is_empty());
    assert_eq!(session.create_roi(RoiCoords::new(0, 0, 2, 2)).unwrap().id, 2);
}

#[test]
fn test_auto_roi_registers_detected_regions() {
    let mut session = AnalysisSession::default();
    session.load_video(buffer(
        blinking_square_frames(40, 40, 16, 0.1, 0.6, (5, 5, 4)),
        10.0,
    ));
    session.create_roi(RoiCoords::new(30, 30, 35, 35)).unwrap();

    let config = AutoRoiConfig {
        min_distance_fraction: 0.5,
        roi_size: 4,
        ..Default::default()
    };
    let run = session.run_auto_roi(Some(&config)).unwrap();
    assert_eq!(run.rois.len(), 1);
    assert_eq!(run.rois[0].id, 2);
    assert_eq!(run.rois[0].origin, RoiOrigin::Auto);
    assert!(session.fluctuation_map().is_some());

    // The detector's average trace seeds the raw trace cache.
    let trace = session.trace(2).unwrap();
    assert_eq!(trace.raw, run.result.candidates[0].average_trace);
}

#[test]
fn test_events_follow_operations() {
    let log = Arc::new(EventLog::new());
    let mut session = AnalysisSession::default();
    session.add_observer(log.clone());

    session.load_video(buffer(random_frames(8, 8, 6, 3), 10.0));
    let roi = session.create_roi(RoiCoords::new(0, 0, 3, 3)).unwrap();
    session.set_selected(roi.id, false).unwrap();
    session.set_selected(roi.id, false).unwrap(); // no change, no event
    session.remove_roi(roi.id).unwrap();

    let events = log.drain();
    assert!(matches!(events[0], SessionEvent::VideoLoaded { epoch: 1, .. }));
    assert_eq!(events[1], SessionEvent::RoiCreated { id: 1 });
    assert_eq!(
        events[2],
        SessionEvent::RoiSelectionChanged {
            id: 1,
            selected: false
        }
    );
    assert_eq!(events[3], SessionEvent::RoiRemoved { id: 1 });
    assert_eq!(events.len(), 4);
}

#[test]
fn test_config_patch_applies_atomically() {
    let mut session = session_with_video();
    let bad = SessionConfigPatch {
        fit_preference: Some(BleachKind::Inverse),
        smoothing_alpha: Some(-1.0),
        ..Default::default()
    };
    assert!(session.update_config(&bad).is_err());
    assert_eq!(session.config().fit_preference, BleachKind::Exponential);

    let good = SessionConfigPatch {
        fit_preference: Some(BleachKind::Inverse),
        ..Default::default()
    };
    session.update_config(&good).unwrap();
    assert_eq!(session.config().fit_preference, BleachKind::Inverse);
}

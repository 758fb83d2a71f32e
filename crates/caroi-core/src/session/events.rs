use std::sync::Mutex;

use crate::bleaching::BleachKind;
use crate::frame::VideoSummary;
use crate::roi::RoiId;

/// Which computation produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    Bleaching,
    Fluctuation,
    AutoRoi,
    Traces,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Bleaching => write!(f, "bleaching fit"),
            JobKind::Fluctuation => write!(f, "fluctuation map"),
            JobKind::AutoRoi => write!(f, "auto-ROI detection"),
            JobKind::Traces => write!(f, "trace extraction"),
        }
    }
}

/// State changes announced by an analysis session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    VideoLoaded {
        epoch: u64,
        summary: VideoSummary,
        /// ROIs dropped because they no longer fit the frame.
        dropped_rois: Vec<RoiId>,
    },
    FitUpdated {
        epoch: u64,
        exponential: bool,
        inverse: bool,
    },
    FitPreferenceChanged {
        kind: BleachKind,
    },
    FluctuationMapReady {
        epoch: u64,
    },
    RoiCreated {
        id: RoiId,
    },
    RoiRemoved {
        id: RoiId,
    },
    RoiSelectionChanged {
        id: RoiId,
        selected: bool,
    },
    /// Cached traces of these ROIs are stale; an empty list means all of them.
    TracesInvalidated {
        roi_ids: Vec<RoiId>,
    },
    StaleResultDiscarded {
        job: JobKind,
        result_epoch: u64,
        current_epoch: u64,
    },
}

/// Receives session events. All methods default to no-ops.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, _event: &SessionEvent) {}
}

/// Observer that simply records every event, in order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<SessionEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all recorded events, leaving the log empty.
    pub fn drain(&self) -> Vec<SessionEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl SessionObserver for EventLog {
    fn on_event(&self, event: &SessionEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

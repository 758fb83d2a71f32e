//! Actor thread that owns an [`AnalysisSession`] and serves it over channels.
//!
//! Commands are handled one at a time in arrival order. CPU-heavy jobs
//! (bleaching fit, fluctuation map, auto-ROI detection) run on the rayon pool
//! against a [`SessionSnapshot`](super::SessionSnapshot); their results come
//! back through the same command queue and are committed only if the
//! recording has not changed in the meantime. A stale result is discarded and
//! its job restarted against the current recording, so every request still
//! gets its completion.

use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::bleaching::{BleachKind, BleachingFits};
use crate::detection::{AutoRoiConfig, AutoRoiResult};
use crate::error::{CaroiError, Result};
use crate::fluctuation::FluctuationMap;
use crate::frame::{FrameBuffer, VideoSummary};
use crate::roi::{IntensityTrace, Roi, RoiCoords, RoiId, TraceSettings};

use super::{
    AnalysisSession, AutoRoiRun, BleachingReport, JobKind, SessionConfig, SessionConfigPatch,
    SessionEvent, SessionObserver, Tagged,
};

/// Requests accepted by a [`SessionWorker`].
pub enum WorkerCommand {
    LoadVideo {
        frames: FrameBuffer,
    },
    UpdateConfig {
        patch: SessionConfigPatch,
    },
    RunBleaching,
    SetFitPreference {
        kind: BleachKind,
    },
    RunFluctuation,
    /// `None` uses the session's auto-ROI configuration.
    RunAutoRoi {
        config: Option<AutoRoiConfig>,
    },
    /// `None` uses the session's default trace settings.
    CreateRoi {
        coords: RoiCoords,
        settings: Option<TraceSettings>,
    },
    UpdateRoi {
        id: RoiId,
        coords: RoiCoords,
    },
    SetSelected {
        id: RoiId,
        selected: bool,
    },
    RemoveRoi {
        id: RoiId,
    },
    ListRois,
    GetTraces {
        ids: Vec<RoiId>,
        alpha: f64,
    },
}

/// Replies and notifications produced by a [`SessionWorker`].
pub enum WorkerResult {
    VideoLoaded {
        epoch: u64,
        summary: VideoSummary,
    },
    ConfigUpdated {
        config: SessionConfig,
    },
    BleachingComplete {
        epoch: u64,
        report: BleachingReport,
    },
    FluctuationComplete {
        epoch: u64,
        map: Arc<FluctuationMap>,
    },
    AutoRoiComplete {
        epoch: u64,
        run: AutoRoiRun,
    },
    RoiCreated {
        roi: Roi,
        trace: Arc<IntensityTrace>,
    },
    RoiUpdated {
        roi: Roi,
    },
    RoiRemoved {
        id: RoiId,
    },
    Rois {
        rois: Vec<Roi>,
    },
    Traces {
        traces: Vec<(RoiId, Arc<IntensityTrace>)>,
    },
    /// A session event, forwarded as it happens.
    Event(SessionEvent),
    Error {
        message: String,
    },
}

enum Message {
    Command(WorkerCommand),
    Job(JobOutput),
    Shutdown,
}

enum JobOutput {
    Bleaching(Tagged<BleachingFits>),
    Fluctuation(Tagged<Arc<FluctuationMap>>),
    AutoRoi {
        config: AutoRoiConfig,
        /// Map computed on the way, when none was cached.
        map: Option<Tagged<Arc<FluctuationMap>>>,
        result: Result<Tagged<AutoRoiResult>>,
    },
}

/// Forwards session events into the result channel.
struct ChannelObserver {
    tx: Mutex<mpsc::Sender<WorkerResult>>,
}

impl SessionObserver for ChannelObserver {
    fn on_event(&self, event: &SessionEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(WorkerResult::Event(event.clone()));
        }
    }
}

/// Handle to a session running on its own thread.
pub struct SessionWorker {
    tx: mpsc::Sender<Message>,
    results: mpsc::Receiver<WorkerResult>,
    handle: Option<JoinHandle<()>>,
}

impl SessionWorker {
    pub fn spawn(config: SessionConfig) -> Result<Self> {
        let session = AnalysisSession::new(config)?;
        let (tx, rx) = mpsc::channel();
        let (result_tx, results) = mpsc::channel();
        let job_tx = tx.clone();

        let handle = thread::Builder::new()
            .name("caroi-session".into())
            .spawn(move || worker_loop(session, rx, job_tx, result_tx))?;

        Ok(Self {
            tx,
            results,
            handle: Some(handle),
        })
    }

    pub fn send(&self, cmd: WorkerCommand) -> Result<()> {
        self.tx
            .send(Message::Command(cmd))
            .map_err(|_| CaroiError::WorkerStopped)
    }

    /// Block until the next result arrives. `None` once the worker is gone.
    pub fn recv(&self) -> Option<WorkerResult> {
        self.results.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerResult> {
        self.results.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<WorkerResult> {
        self.results.try_recv().ok()
    }

    /// Stop the worker thread and wait for it to exit. Running jobs finish
    /// on the pool but their results are dropped.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send(tx: &mpsc::Sender<WorkerResult>, msg: WorkerResult) {
    let _ = tx.send(msg);
}

fn send_error(tx: &mpsc::Sender<WorkerResult>, err: CaroiError) {
    send(
        tx,
        WorkerResult::Error {
            message: err.to_string(),
        },
    );
}

fn worker_loop(
    mut session: AnalysisSession,
    rx: mpsc::Receiver<Message>,
    job_tx: mpsc::Sender<Message>,
    tx: mpsc::Sender<WorkerResult>,
) {
    session.add_observer(Arc::new(ChannelObserver {
        tx: Mutex::new(tx.clone()),
    }));

    while let Ok(msg) = rx.recv() {
        match msg {
            Message::Command(cmd) => handle_command(&mut session, cmd, &job_tx, &tx),
            Message::Job(output) => handle_job(&mut session, output, &job_tx, &tx),
            Message::Shutdown => break,
        }
    }
    debug!("Session worker stopped");
}

fn handle_command(
    session: &mut AnalysisSession,
    cmd: WorkerCommand,
    job_tx: &mpsc::Sender<Message>,
    tx: &mpsc::Sender<WorkerResult>,
) {
    match cmd {
        WorkerCommand::LoadVideo { frames } => {
            let summary = session.load_video(frames);
            send(
                tx,
                WorkerResult::VideoLoaded {
                    epoch: session.epoch(),
                    summary,
                },
            );
        }
        WorkerCommand::UpdateConfig { patch } => match session.update_config(&patch) {
            Ok(config) => send(
                tx,
                WorkerResult::ConfigUpdated {
                    config: config.clone(),
                },
            ),
            Err(e) => send_error(tx, e),
        },
        WorkerCommand::RunBleaching => dispatch_bleaching(session, job_tx, tx),
        WorkerCommand::SetFitPreference { kind } => session.set_fit_preference(kind),
        WorkerCommand::RunFluctuation => dispatch_fluctuation(session, job_tx, tx),
        WorkerCommand::RunAutoRoi { config } => {
            let config = config.unwrap_or_else(|| session.config().auto_roi.clone());
            dispatch_auto_roi(session, config, job_tx, tx);
        }
        WorkerCommand::CreateRoi { coords, settings } => {
            let settings = settings.unwrap_or_else(|| session.config().trace_settings());
            match session.create_roi_with(coords, settings) {
                Ok((roi, trace)) => send(tx, WorkerResult::RoiCreated { roi, trace }),
                Err(e) => send_error(tx, e),
            }
        }
        WorkerCommand::UpdateRoi { id, coords } => match session.update_roi_coords(id, coords) {
            Ok(roi) => send(tx, WorkerResult::RoiUpdated { roi }),
            Err(e) => send_error(tx, e),
        },
        WorkerCommand::SetSelected { id, selected } => {
            match session.set_selected(id, selected).and_then(|_| session.roi(id).cloned()) {
                Ok(roi) => send(tx, WorkerResult::RoiUpdated { roi }),
                Err(e) => send_error(tx, e),
            }
        }
        WorkerCommand::RemoveRoi { id } => match session.remove_roi(id) {
            Ok(_) => send(tx, WorkerResult::RoiRemoved { id }),
            Err(e) => send_error(tx, e),
        },
        WorkerCommand::ListRois => send(
            tx,
            WorkerResult::Rois {
                rois: session.list_rois(),
            },
        ),
        WorkerCommand::GetTraces { ids, alpha } => match session.traces(&ids, alpha) {
            Ok(traces) => send(tx, WorkerResult::Traces { traces }),
            Err(e) => send_error(tx, e),
        },
    }
}

fn dispatch_bleaching(
    session: &AnalysisSession,
    job_tx: &mpsc::Sender<Message>,
    tx: &mpsc::Sender<WorkerResult>,
) {
    match session.snapshot() {
        Ok(snapshot) => {
            let job_tx = job_tx.clone();
            rayon::spawn(move || {
                let fits = snapshot.compute_bleaching();
                let _ = job_tx.send(Message::Job(JobOutput::Bleaching(fits)));
            });
        }
        Err(e) => send_error(tx, e),
    }
}

/// Serves the cached map directly; computes it on the pool otherwise.
fn dispatch_fluctuation(
    session: &AnalysisSession,
    job_tx: &mpsc::Sender<Message>,
    tx: &mpsc::Sender<WorkerResult>,
) {
    if let Some(map) = session.fluctuation_map() {
        send(
            tx,
            WorkerResult::FluctuationComplete {
                epoch: session.epoch(),
                map,
            },
        );
        return;
    }
    match session.snapshot() {
        Ok(snapshot) => {
            let job_tx = job_tx.clone();
            rayon::spawn(move || {
                let map = snapshot.compute_fluctuation();
                let _ = job_tx.send(Message::Job(JobOutput::Fluctuation(map)));
            });
        }
        Err(e) => send_error(tx, e),
    }
}

fn dispatch_auto_roi(
    session: &AnalysisSession,
    config: AutoRoiConfig,
    job_tx: &mpsc::Sender<Message>,
    tx: &mpsc::Sender<WorkerResult>,
) {
    let cached = session.fluctuation_map();
    match session.snapshot() {
        Ok(snapshot) => {
            let job_tx = job_tx.clone();
            rayon::spawn(move || {
                let (fresh, map) = match cached {
                    Some(map) => (None, map),
                    None => {
                        let tagged = snapshot.compute_fluctuation();
                        let map = Arc::clone(&tagged.value);
                        (Some(tagged), map)
                    }
                };
                let result = snapshot.compute_auto_roi(&map, &config);
                let _ = job_tx.send(Message::Job(JobOutput::AutoRoi {
                    config,
                    map: fresh,
                    result,
                }));
            });
        }
        Err(e) => send_error(tx, e),
    }
}

/// Commit a finished job. A result computed against an older recording is
/// dropped and the same job is started again on the current one.
fn handle_job(
    session: &mut AnalysisSession,
    output: JobOutput,
    job_tx: &mpsc::Sender<Message>,
    tx: &mpsc::Sender<WorkerResult>,
) {
    match output {
        JobOutput::Bleaching(tagged) => match session.commit_bleaching(tagged) {
            Ok(report) => send(
                tx,
                WorkerResult::BleachingComplete {
                    epoch: session.epoch(),
                    report,
                },
            ),
            Err(CaroiError::StaleResult { .. }) => {
                debug!(job = %JobKind::Bleaching, "Re-running stale job");
                dispatch_bleaching(session, job_tx, tx);
            }
            Err(e) => send_error(tx, e),
        },
        JobOutput::Fluctuation(tagged) => match session.commit_fluctuation(tagged) {
            Ok(map) => send(
                tx,
                WorkerResult::FluctuationComplete {
                    epoch: session.epoch(),
                    map,
                },
            ),
            Err(CaroiError::StaleResult { .. }) => {
                debug!(job = %JobKind::Fluctuation, "Re-running stale job");
                dispatch_fluctuation(session, job_tx, tx);
            }
            Err(e) => send_error(tx, e),
        },
        JobOutput::AutoRoi {
            config,
            map,
            result,
        } => {
            let committed = match map {
                Some(map) => session.commit_fluctuation(map).map(|_| ()),
                None => Ok(()),
            };
            match committed.and_then(|_| result.and_then(|tagged| session.commit_auto_roi(tagged))) {
                Ok(run) => send(
                    tx,
                    WorkerResult::AutoRoiComplete {
                        epoch: session.epoch(),
                        run,
                    },
                ),
                Err(CaroiError::StaleResult { .. }) => {
                    debug!(job = %JobKind::AutoRoi, "Re-running stale job");
                    dispatch_auto_roi(session, config, job_tx, tx);
                }
                Err(e) => send_error(tx, e),
            }
        }
    }
}

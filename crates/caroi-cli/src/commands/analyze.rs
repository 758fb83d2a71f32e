use std::path::PathBuf;

use anyhow::{Context, Result};
use caroi_core::io::export::{save_bleaching_csv, save_roi_set, save_traces_csv, RoiSet};
use caroi_core::io::image_io::save_tiff;
use caroi_core::io::overlay::save_overlay;
use caroi_core::session::AnalysisSession;
use clap::Args;
use tracing::info;

use super::{load_input, load_session_config, spinner, InputArgs};
use crate::summary::{print_analysis_summary, print_roi_table, AnalysisSummary};

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Workspace directory for all outputs (created if missing)
    #[arg(short, long, default_value = "caroi-out")]
    pub workspace: PathBuf,

    /// Session config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Bleaching fit, fluctuation map, ROI detection and trace export in one go.
pub fn run(args: &AnalyzeArgs) -> Result<()> {
    let config = load_session_config(args.config.as_deref())?;
    std::fs::create_dir_all(&args.workspace)
        .with_context(|| format!("Failed to create {}", args.workspace.display()))?;

    let mut session = AnalysisSession::new(config)?;
    let video = session.load_video(load_input(&args.input)?);

    let pb = spinner("Fitting bleaching and computing fluctuation map")?;
    let snapshot = session.snapshot()?;
    let (fits, map) = rayon::join(
        || snapshot.compute_bleaching(),
        || snapshot.compute_fluctuation(),
    );
    let report = session.commit_bleaching(fits)?;
    let map = session.commit_fluctuation(map)?;
    pb.finish_with_message("Bleaching fit and fluctuation map ready");

    let pb = spinner("Detecting ROIs")?;
    let run = session.run_auto_roi(None)?;
    pb.finish_with_message(format!("Detected {} ROIs", run.rois.len()));

    let pb = spinner("Extracting traces")?;
    let traces = session.selected_traces()?;
    pb.finish_with_message(format!("Extracted {} traces", traces.len()));

    let ws = &args.workspace;
    let frames = session.frames()?;
    let first = &frames.frames()[0].data;

    let bleaching_path = ws.join("bleaching.csv");
    save_bleaching_csv(
        &bleaching_path,
        &frames.time_points(),
        &frames.mean_intensity(),
        &report.fits,
    )
    .context("Failed to write bleaching curves")?;

    let map_path = ws.join("fluctuation.tiff");
    save_tiff(&map.scores, &map_path).context("Failed to write fluctuation map")?;

    let overlay_path = ws.join("overlay.png");
    let coords: Vec<_> = run.rois.iter().map(|r| r.coords).collect();
    save_overlay(&overlay_path, first, &map, &coords).context("Failed to write overlay")?;

    let rois_path = ws.join("rois.json");
    let set = RoiSet::new(frames.width(), frames.height(), session.list_rois());
    save_roi_set(&rois_path, &set).context("Failed to write ROI set")?;

    let traces_path = ws.join("traces.csv");
    save_traces_csv(&traces_path, &traces).context("Failed to write traces")?;

    let config_path = ws.join("session.toml");
    std::fs::write(&config_path, toml::to_string_pretty(session.config())?)
        .context("Failed to write session config")?;

    info!(workspace = %ws.display(), "Analysis outputs written");

    print_roi_table(&run.rois, &run.result);
    print_analysis_summary(&AnalysisSummary {
        input: &args.input.input,
        workspace: ws,
        video: &video,
        report: &report,
        stats: &run.result.stats,
        trace_count: traces.len(),
    });

    Ok(())
}

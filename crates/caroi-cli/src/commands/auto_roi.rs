use std::path::PathBuf;

use anyhow::{Context, Result};
use caroi_core::detection::AutoRoiConfig;
use caroi_core::io::export::{save_roi_set, RoiSet};
use caroi_core::io::overlay::save_overlay;
use caroi_core::session::AnalysisSession;
use clap::Args;

use super::{load_input, load_session_config, spinner, InputArgs};
use crate::summary::print_roi_table;

#[derive(Args)]
pub struct AutoRoiArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Session config file (TOML); flags below override its auto_roi section
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Score percentile (0-100) a pixel must reach to be a candidate
    #[arg(long)]
    pub percentile: Option<f64>,

    /// Minimum ROI spacing as a fraction of frame width; ROIs never overlap
    #[arg(long)]
    pub min_distance: Option<f64>,

    /// Number of trace similarity clusters
    #[arg(long)]
    pub clusters: Option<usize>,

    /// Side length of each ROI square in pixels
    #[arg(long)]
    pub roi_size: Option<usize>,

    /// Maximum number of ROIs to keep
    #[arg(long)]
    pub max_rois: Option<usize>,

    /// Save detected ROIs as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Save the fluctuation overlay with ROI outlines (PNG)
    #[arg(long)]
    pub overlay: Option<PathBuf>,
}

impl AutoRoiArgs {
    fn detection_config(&self, base: &AutoRoiConfig) -> AutoRoiConfig {
        AutoRoiConfig {
            threshold_percentile: self.percentile.unwrap_or(base.threshold_percentile),
            min_distance_fraction: self.min_distance.unwrap_or(base.min_distance_fraction),
            cluster_count: self.clusters.unwrap_or(base.cluster_count),
            roi_size: self.roi_size.unwrap_or(base.roi_size),
            max_rois: self.max_rois.unwrap_or(base.max_rois),
        }
    }
}

pub fn run(args: &AutoRoiArgs) -> Result<()> {
    let session_config = load_session_config(args.config.as_deref())?;
    let detection = args.detection_config(&session_config.auto_roi);
    detection.validate().context("Invalid auto-ROI parameters")?;

    let frames = load_input(&args.input)?;
    let mut session = AnalysisSession::new(session_config)?;
    session.load_video(frames);

    let pb = spinner("Detecting ROIs")?;
    let run = session.run_auto_roi(Some(&detection))?;
    pb.finish_with_message(format!(
        "Detected {} ROIs ({} candidate pixels above {:.3})",
        run.rois.len(),
        run.result.stats.candidate_pixels,
        run.result.stats.cutoff
    ));

    print_roi_table(&run.rois, &run.result);

    let frames = session.frames()?;
    if let Some(ref path) = args.output {
        let set = RoiSet::new(frames.width(), frames.height(), session.list_rois());
        save_roi_set(path, &set)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved ROIs to {}", path.display());
    }

    if let Some(ref path) = args.overlay {
        if let Some(map) = session.fluctuation_map() {
            let coords: Vec<_> = run.rois.iter().map(|r| r.coords).collect();
            save_overlay(path, &frames.frames()[0].data, &map, &coords)
                .with_context(|| format!("Failed to save overlay {}", path.display()))?;
            println!("Saved overlay to {}", path.display());
        }
    }

    Ok(())
}

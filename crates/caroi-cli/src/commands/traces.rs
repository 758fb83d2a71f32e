use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use caroi_core::io::export::{load_roi_set, save_traces_csv};
use caroi_core::roi::RoiCoords;
use caroi_core::session::{AnalysisSession, SessionConfigPatch};
use clap::Args;

use super::{load_input, load_session_config, parse_roi, spinner, FitArg, InputArgs};

#[derive(Args)]
pub struct TracesArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// ROI set JSON (as written by `auto-roi --output`)
    #[arg(long)]
    pub rois: Option<PathBuf>,

    /// ROI rectangle x0,y0,x1,y1 (repeatable)
    #[arg(long = "roi", value_parser = parse_roi)]
    pub roi: Vec<RoiCoords>,

    /// Session config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bleaching model used for correction
    #[arg(long, value_enum)]
    pub fit: Option<FitArg>,

    /// Skip bleaching correction
    #[arg(long)]
    pub no_adjust: bool,

    /// Smoothing strength in [0, 1]
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Output CSV path
    #[arg(short, long, default_value = "traces.csv")]
    pub output: PathBuf,
}

pub fn run(args: &TracesArgs) -> Result<()> {
    let mut rois = args.roi.clone();
    if let Some(ref path) = args.rois {
        let set = load_roi_set(path)
            .with_context(|| format!("Failed to read ROI set {}", path.display()))?;
        rois.extend(set.rois.iter().map(|r| r.coords));
    }
    if rois.is_empty() {
        bail!("No ROIs given; use --roi or --rois");
    }

    let mut session = AnalysisSession::new(load_session_config(args.config.as_deref())?)?;
    let patch = SessionConfigPatch {
        fit_preference: args.fit.map(Into::into),
        adjust_bleaching: args.no_adjust.then_some(false),
        smoothing_alpha: args.alpha,
        ..Default::default()
    };
    session
        .update_config(&patch)
        .context("Invalid trace settings")?;

    session.load_video(load_input(&args.input)?);

    if session.config().adjust_bleaching {
        let pb = spinner("Fitting bleaching models")?;
        let report = session.run_bleaching_fit()?;
        match report.preferred_fit() {
            Some(fit) => pb.finish_with_message(format!(
                "{} fit, time constant {:.3} s",
                fit.kind, fit.params.1
            )),
            None => pb.finish_with_message(format!(
                "{} fit unavailable; traces are uncorrected",
                report.preferred
            )),
        }
    }

    let mut ids = Vec::with_capacity(rois.len());
    for coords in rois {
        let roi = session
            .create_roi(coords)
            .with_context(|| format!("ROI {coords} does not fit the recording"))?;
        ids.push(roi.id);
    }

    let pb = spinner(format!("Extracting {} traces", ids.len()))?;
    let alpha = session.config().smoothing_alpha;
    let traces = session.traces(&ids, alpha)?;
    pb.finish_with_message(format!("Extracted {} traces", traces.len()));

    for (id, trace) in &traces {
        let n = trace.smoothed.len().max(1) as f64;
        let mean = trace.smoothed.iter().sum::<f64>() / n;
        let (lo, hi) = trace
            .smoothed
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        println!("ROI{:<4} mean {:.4}  range {:.4} .. {:.4}", id, mean, lo, hi);
    }

    save_traces_csv(&args.output, &traces)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Saved traces to {}", args.output.display());

    Ok(())
}

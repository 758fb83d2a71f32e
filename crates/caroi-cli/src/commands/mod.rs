pub mod analyze;
pub mod auto_roi;
pub mod bleaching;
pub mod config;
pub mod fluctuation;
pub mod info;
pub mod traces;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use caroi_core::bleaching::BleachKind;
use caroi_core::consts::DEFAULT_FPS;
use caroi_core::frame::FrameBuffer;
use caroi_core::io::load_frame_buffer;
use caroi_core::roi::RoiCoords;
use caroi_core::session::SessionConfig;
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

/// Recording input shared by all analysis commands.
#[derive(Args)]
pub struct InputArgs {
    /// SER file, single TIFF/PNG, or directory of TIFF/PNG frames
    pub input: PathBuf,

    /// Frame rate when the input carries no timestamps
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: f64,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FitArg {
    Exponential,
    Inverse,
}

impl From<FitArg> for BleachKind {
    fn from(arg: FitArg) -> Self {
        match arg {
            FitArg::Exponential => BleachKind::Exponential,
            FitArg::Inverse => BleachKind::Inverse,
        }
    }
}

pub fn spinner(msg: impl Into<String>) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg} ({elapsed})")?);
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

pub fn load_input(args: &InputArgs) -> Result<FrameBuffer> {
    let pb = spinner(format!("Loading {}", args.input.display()))?;
    let frames = load_frame_buffer(&args.input, args.fps)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    pb.finish_with_message(format!(
        "Loaded {} frames ({}x{} @ {:.2} fps)",
        frames.len(),
        frames.width(),
        frames.height(),
        frames.fps()
    ));
    Ok(frames)
}

/// Session settings from an optional TOML file; defaults otherwise.
pub fn load_session_config(path: Option<&Path>) -> Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: SessionConfig = toml::from_str(&contents).context("Invalid session config")?;
    config.validate().context("Invalid session config")?;
    Ok(config)
}

/// Parse `x0,y0,x1,y1` (half-open pixel rectangle).
pub fn parse_roi(s: &str) -> std::result::Result<RoiCoords, String> {
    let parts: Vec<usize> = s
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid ROI '{s}': {e}"))?;
    match parts.as_slice() {
        &[x0, y0, x1, y1] => Ok(RoiCoords::new(x0, y0, x1, y1)),
        _ => Err(format!("ROI '{s}' must be x0,y0,x1,y1")),
    }
}

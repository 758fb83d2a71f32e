use std::path::PathBuf;

use anyhow::{Context, Result};
use caroi_core::fluctuation::compute_fluctuation_map;
use caroi_core::io::image_io::save_image;
use caroi_core::io::overlay::save_overlay;
use clap::Args;

use super::{load_input, spinner, InputArgs};

#[derive(Args)]
pub struct FluctuationArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output path for the normalized map (TIFF or PNG)
    #[arg(short, long, default_value = "fluctuation.tiff")]
    pub output: PathBuf,

    /// Also save a colormapped overlay on the first frame (PNG)
    #[arg(long)]
    pub overlay: Option<PathBuf>,
}

pub fn run(args: &FluctuationArgs) -> Result<()> {
    let frames = load_input(&args.input)?;

    let pb = spinner("Computing fluctuation map")?;
    let map = compute_fluctuation_map(&frames);
    pb.finish_with_message(format!(
        "Fluctuation map ready (raw std dev {:.5} .. {:.5})",
        map.raw_min, map.raw_max
    ));

    save_image(&map.scores, &args.output)
        .with_context(|| format!("Failed to save {}", args.output.display()))?;
    println!("Saved map to {}", args.output.display());

    if let Some(ref path) = args.overlay {
        save_overlay(path, &frames.frames()[0].data, &map, &[])
            .with_context(|| format!("Failed to save overlay {}", path.display()))?;
        println!("Saved overlay to {}", path.display());
    }

    Ok(())
}

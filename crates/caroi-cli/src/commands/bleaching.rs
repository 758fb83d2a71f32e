use std::path::PathBuf;

use anyhow::{Context, Result};
use caroi_core::bleaching::{fit, BleachKind};
use caroi_core::io::export::save_bleaching_csv;
use clap::Args;

use super::{load_input, spinner, InputArgs};

#[derive(Args)]
pub struct BleachingArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write mean intensity and both fitted curves as CSV
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &BleachingArgs) -> Result<()> {
    let frames = load_input(&args.input)?;

    let pb = spinner("Fitting bleaching models")?;
    let time_points = frames.time_points();
    let mean = frames.mean_intensity();
    let fits = fit(&mean, &time_points);
    pb.finish_with_message("Bleaching fit complete");

    for kind in BleachKind::ALL {
        match fits.get(kind) {
            Some(f) => {
                let r2 = f
                    .r2
                    .map_or_else(|| "n/a".to_string(), |r| format!("{r:.4}"));
                println!(
                    "{:<12} a = {:.4}  b = {:.3} s  R\u{b2} = {}",
                    kind, f.params.0, f.params.1, r2
                );
            }
            None => {
                let reason = fits
                    .failures
                    .iter()
                    .find(|(k, _)| *k == kind)
                    .map_or_else(|| "no fit".to_string(), |(_, e)| e.to_string());
                println!("{:<12} {}", kind, reason);
            }
        }
    }

    if let Some(ref path) = args.output {
        save_bleaching_csv(path, &time_points, &mean, &fits)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved bleaching curves to {}", path.display());
    }

    Ok(())
}

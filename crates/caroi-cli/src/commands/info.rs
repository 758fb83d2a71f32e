use anyhow::Result;
use caroi_core::io::ser::SerReader;
use clap::Args;

use super::{load_input, InputArgs};

#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let path = &args.input.input;
    let is_ser = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ser"));

    if is_ser {
        let reader = SerReader::open(path)?;
        let info = reader.source_info(path);
        println!("File:        {}", info.filename.display());
        println!("Frames:      {}", info.total_frames);
        println!("Dimensions:  {}x{}", info.width, info.height);
        println!("Bit depth:   {}", info.bit_depth);
        println!("Color mode:  {:?}", info.color_mode);
        match info.fps {
            Some(fps) => println!("Frame rate:  {:.3} fps (timestamps)", fps),
            None => println!("Frame rate:  unknown (using {} fps)", args.input.fps),
        }
        if let Some(ref inst) = info.instrument {
            println!("Instrument:  {}", inst);
        }
        println!();
    }

    let frames = load_input(&args.input)?;
    let summary = frames.summary();
    println!("Frames:      {}", summary.frame_count);
    println!("Dimensions:  {}x{}", summary.width, summary.height);
    println!("Frame rate:  {:.3} fps", summary.fps);
    println!("Duration:    {:.2} s", summary.duration_s);
    println!(
        "First frame: mean {:.4}, min {:.4}, max {:.4}",
        summary.first_frame_mean, summary.first_frame_min, summary.first_frame_max
    );

    Ok(())
}

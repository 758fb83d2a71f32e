//! CSV and JSON exports of analysis results.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bleaching::{BleachingFit, BleachingFits};
use crate::consts::ROI_SET_VERSION;
use crate::error::{CaroiError, Result};
use crate::roi::{IntensityTrace, Roi, RoiId};

/// Write presented (smoothed) traces as CSV: a `time_s` column followed by
/// one `ROI<id>` column per trace, in the given order.
pub fn write_traces_csv<W: Write>(out: W, traces: &[(RoiId, Arc<IntensityTrace>)]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);

    let mut header = vec!["time_s".to_string()];
    header.extend(traces.iter().map(|(id, _)| format!("ROI{id}")));
    writer.write_record(&header)?;

    let rows = traces.first().map(|(_, t)| t.time_points.len()).unwrap_or(0);
    for i in 0..rows {
        let mut record = Vec::with_capacity(traces.len() + 1);
        record.push(traces[0].1.time_points[i].to_string());
        for (_, trace) in traces {
            record.push(
                trace
                    .smoothed
                    .get(i)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_traces_csv(path: &Path, traces: &[(RoiId, Arc<IntensityTrace>)]) -> Result<()> {
    write_traces_csv(BufWriter::new(File::create(path)?), traces)?;
    debug!(path = %path.display(), rois = traces.len(), "Traces exported");
    Ok(())
}

/// Write the bleaching signal and both fitted curves. A model that was not
/// fitted leaves its column empty.
pub fn write_bleaching_csv<W: Write>(
    out: W,
    time_points: &[f64],
    mean_intensity: &[f64],
    fits: &BleachingFits,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["time_s", "mean_intensity", "exponential_fit", "inverse_fit"])?;

    let column = |fit: Option<&BleachingFit>, t: f64| {
        fit.map(|f| f.evaluate(t).to_string()).unwrap_or_default()
    };
    for (&t, &y) in time_points.iter().zip(mean_intensity) {
        writer.write_record([
            t.to_string(),
            y.to_string(),
            column(fits.exponential.as_ref(), t),
            column(fits.inverse.as_ref(), t),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_bleaching_csv(
    path: &Path,
    time_points: &[f64],
    mean_intensity: &[f64],
    fits: &BleachingFits,
) -> Result<()> {
    write_bleaching_csv(
        BufWriter::new(File::create(path)?),
        time_points,
        mean_intensity,
        fits,
    )
}

/// Persisted ROI definitions, tied to the frame size they were drawn on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoiSet {
    pub version: u32,
    pub width: usize,
    pub height: usize,
    pub rois: Vec<Roi>,
}

impl RoiSet {
    pub fn new(width: usize, height: usize, rois: Vec<Roi>) -> Self {
        Self {
            version: ROI_SET_VERSION,
            width,
            height,
            rois,
        }
    }
}

pub fn save_roi_set(path: &Path, set: &RoiSet) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, set)?;
    out.flush()?;
    Ok(())
}

/// Read an ROI set, rejecting unknown versions and rectangles outside the
/// recorded frame size.
pub fn load_roi_set(path: &Path) -> Result<RoiSet> {
    let set: RoiSet = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    if set.version != ROI_SET_VERSION {
        return Err(CaroiError::InvalidParameter(format!(
            "unsupported ROI set version {} (expected {})",
            set.version, ROI_SET_VERSION
        )));
    }
    for roi in &set.rois {
        roi.coords.validate(set.width, set.height)?;
    }
    Ok(set)
}

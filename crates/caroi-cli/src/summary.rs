use std::path::Path;

use caroi_core::bleaching::BleachKind;
use caroi_core::detection::{AutoRoiResult, AutoRoiStats};
use caroi_core::frame::VideoSummary;
use caroi_core::roi::Roi;
use caroi_core::session::BleachingReport;
use console::Style;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub struct AnalysisSummary<'a> {
    pub input: &'a Path,
    pub workspace: &'a Path,
    pub video: &'a VideoSummary,
    pub report: &'a BleachingReport,
    pub stats: &'a AutoRoiStats,
    pub trace_count: usize,
}

pub fn print_analysis_summary(summary: &AnalysisSummary<'_>) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Calcium ROI Analysis"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(20)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(summary.input.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Workspace"),
        s.path.apply_to(summary.workspace.display())
    );
    println!();

    // Recording
    let v = summary.video;
    println!("  {}", s.header.apply_to("Recording"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(v.frame_count)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Size"),
        s.value.apply_to(format!("{}x{}", v.width, v.height))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Rate"),
        s.value.apply_to(format!("{:.2} fps ({:.1} s)", v.fps, v.duration_s))
    );
    println!();

    // Bleaching
    println!("  {}", s.header.apply_to("Bleaching"));
    for kind in BleachKind::ALL {
        let marker = if kind == summary.report.preferred { "*" } else { " " };
        match summary.report.fits.get(kind) {
            Some(fit) => println!(
                "   {}{:<12}{}",
                marker,
                s.label.apply_to(kind),
                s.method.apply_to(format!(
                    "tau {:.3} s, R\u{b2} {}",
                    fit.params.1,
                    fit.r2.map_or_else(|| "n/a".to_string(), |r| format!("{r:.4}"))
                ))
            ),
            None => println!(
                "   {}{:<12}{}",
                marker,
                s.label.apply_to(kind),
                s.disabled.apply_to("not fitted")
            ),
        }
    }
    println!();

    // Detection
    let st = summary.stats;
    println!("  {}", s.header.apply_to("Auto ROI"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Cutoff"),
        s.value.apply_to(format!("{:.3}", st.cutoff))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Candidates"),
        s.value.apply_to(st.candidate_pixels)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Spacing"),
        s.value.apply_to(format!("{:.1} px", st.min_distance_px))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Accepted"),
        s.value.apply_to(format!("{} ({:.1}% of frame)", st.accepted, st.coverage_percent))
    );
    if !st.cluster_sizes.is_empty() {
        println!(
            "    {:<12}{:?}",
            s.label.apply_to("Clusters"),
            st.cluster_sizes
        );
    }
    println!();

    println!(
        "  {:<14}{}",
        s.header.apply_to("Traces"),
        s.value.apply_to(summary.trace_count)
    );
    println!();
}

/// One line per detected ROI: id, rectangle, peak score, cluster.
pub fn print_roi_table(rois: &[Roi], result: &AutoRoiResult) {
    let s = Styles::new();
    if rois.is_empty() {
        println!("  {}", s.disabled.apply_to("No ROIs detected"));
        return;
    }

    println!();
    println!(
        "  {:<6}{:<22}{:<8}{}",
        s.header.apply_to("ID"),
        s.header.apply_to("Rectangle"),
        s.header.apply_to("Score"),
        s.header.apply_to("Cluster")
    );
    for (roi, cand) in rois.iter().zip(&result.candidates) {
        let cluster = roi
            .cluster
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        println!(
            "  {:<6}{:<22}{:<8}{}",
            s.value.apply_to(roi.id),
            roi.coords.to_string(),
            format!("{:.3}", cand.score),
            s.method.apply_to(cluster)
        );
    }
    println!();
}

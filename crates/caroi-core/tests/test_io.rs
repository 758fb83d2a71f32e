mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use ndarray::Array2;

use caroi_core::bleaching::fit;
use caroi_core::error::CaroiError;
use caroi_core::fluctuation::compute_fluctuation_map;
use caroi_core::frame::ColorMode;
use caroi_core::io::export::{
    load_roi_set, save_roi_set, write_bleaching_csv, write_traces_csv, RoiSet,
};
use caroi_core::io::image_io::{load_image_sequence, save_png};
use caroi_core::io::load_frame_buffer;
use caroi_core::io::overlay::save_overlay;
use caroi_core::io::ser::SerReader;
use caroi_core::roi::{extract_trace, Roi, RoiCoords, RoiOrigin, TraceSettings};
use common::{
    buffer, build_ser, build_ser_header, exponential_decay_frames, random_frames, write_temp,
};

fn ramp_frames(width: usize, height: usize, n: usize) -> Vec<Vec<u8>> {
    (0..n)
        .map(|f| {
            (0..width * height)
                .map(|i| ((i * 10 + f) % 256) as u8)
                .collect()
        })
        .collect()
}

#[test]
fn test_ser_mono_frames_are_normalized() {
    let frames = ramp_frames(4, 3, 5);
    let file = write_temp(&build_ser(4, 3, &frames, None), ".ser");

    let reader = SerReader::open(file.path()).unwrap();
    assert_eq!(reader.frame_count(), 5);
    assert_eq!(reader.header.color_mode(), ColorMode::Mono);

    let frame = reader.read_frame(2).unwrap();
    assert_eq!(frame.data.dim(), (3, 4));
    assert_relative_eq!(frame.data[[1, 2]], frames[2][6] as f32 / 255.0, epsilon = 1e-6);
    assert!(matches!(
        reader.read_frame(5),
        Err(CaroiError::FrameIndexOutOfRange { index: 5, total: 5 })
    ));
}

#[test]
fn test_ser_fps_from_timestamps() {
    let frames = ramp_frames(2, 2, 4);
    // 25 fps in 100 ns ticks.
    let ts: Vec<u64> = (0..4).map(|i| 1_000_000 + i * 400_000).collect();
    let file = write_temp(&build_ser(2, 2, &frames, Some(&ts)), ".ser");

    let reader = SerReader::open(file.path()).unwrap();
    assert_relative_eq!(reader.estimated_fps().unwrap(), 25.0, epsilon = 1e-9);

    let info = reader.source_info(file.path());
    assert_eq!(info.instrument.as_deref(), Some("Scope1"));

    let buffer = load_frame_buffer(file.path(), 5.0).unwrap();
    assert_relative_eq!(buffer.fps(), 25.0, epsilon = 1e-9);
    assert_eq!(buffer.len(), 4);
}

#[test]
fn test_ser_without_trailer_uses_fallback_fps() {
    let file = write_temp(&build_ser(3, 3, &ramp_frames(3, 3, 3), None), ".ser");
    let buffer = load_frame_buffer(file.path(), 12.5).unwrap();
    assert_eq!(buffer.fps(), 12.5);
}

#[test]
fn test_ser_rgb_reduced_to_luminance() {
    let mut data = build_ser_header(1, 1, 8, 1, 100);
    data.extend_from_slice(&[255, 0, 0]);
    let file = write_temp(&data, ".ser");
    let frame = SerReader::open(file.path()).unwrap().read_frame(0).unwrap();
    assert_relative_eq!(frame.data[[0, 0]], 0.299, epsilon = 1e-5);
}

#[test]
fn test_ser_truncated_and_bad_magic() {
    let mut data = build_ser(4, 4, &ramp_frames(4, 4, 2), None);
    data.truncate(data.len() - 3);
    let file = write_temp(&data, ".ser");
    assert!(matches!(
        SerReader::open(file.path()),
        Err(CaroiError::InvalidSer(_))
    ));

    let mut data = build_ser(2, 2, &ramp_frames(2, 2, 1), None);
    data[0] = b'X';
    let file = write_temp(&data, ".ser");
    assert!(SerReader::open(file.path()).is_err());
}

#[test]
fn test_image_sequence_loads_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    for (i, v) in [0.2f32, 0.6, 1.0].iter().enumerate() {
        let frame = Array2::from_elem((4, 5), *v);
        save_png(&frame, &dir.path().join(format!("frame_{i:03}.png"))).unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let frames = load_image_sequence(dir.path(), 20.0).unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!((frames.width(), frames.height()), (5, 4));
    let means = frames.mean_intensity();
    assert!(means[0] < means[1] && means[1] < means[2]);
}

#[test]
fn test_empty_directory_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_frame_buffer(dir.path(), 10.0),
        Err(CaroiError::VideoLoad(_))
    ));
}

#[test]
fn test_traces_csv_layout() {
    let frames = buffer(random_frames(6, 6, 4, 1), 2.0);
    let settings = TraceSettings::default();
    let traces: Vec<_> = [(3u64, RoiCoords::new(0, 0, 2, 2)), (7, RoiCoords::new(2, 2, 6, 6))]
        .iter()
        .map(|&(id, c)| {
            (
                id,
                Arc::new(extract_trace(&frames, id, &c, None, &settings).unwrap()),
            )
        })
        .collect();

    let mut out = Vec::new();
    write_traces_csv(&mut out, &traces).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "time_s,ROI3,ROI7");
    assert_eq!(lines.len(), 5);
    assert!(lines[2].starts_with("0.5,"));
}

#[test]
fn test_bleaching_csv_has_both_fit_columns() {
    let frames = buffer(exponential_decay_frames(2, 2, 10, 10.0, 5.0, 1.0), 10.0);
    let t = frames.time_points();
    let y = frames.mean_intensity();
    let fits = fit(&y, &t);

    let mut out = Vec::new();
    write_bleaching_csv(&mut out, &t, &y, &fits).unwrap();
    let text = String::from_utf8(out).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("time_s,mean_intensity,exponential_fit,inverse_fit")
    );
    assert_eq!(lines.count(), 10);
}

#[test]
fn test_roi_set_round_trip_and_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rois.json");
    let rois = vec![
        Roi {
            id: 1,
            coords: RoiCoords::new(0, 0, 4, 4),
            selected: true,
            origin: RoiOrigin::Drawn,
            cluster: None,
        },
        Roi {
            id: 4,
            coords: RoiCoords::new(5, 5, 9, 9),
            selected: false,
            origin: RoiOrigin::Auto,
            cluster: Some(2),
        },
    ];
    let set = RoiSet::new(10, 10, rois);
    save_roi_set(&path, &set).unwrap();
    assert_eq!(load_roi_set(&path).unwrap(), set);

    let bad = RoiSet::new(6, 6, set.rois.clone());
    save_roi_set(&path, &bad).unwrap();
    assert!(matches!(load_roi_set(&path), Err(CaroiError::InvalidRoi(_))));
}

#[test]
fn test_overlay_png_matches_frame_size() {
    let frames = buffer(random_frames(12, 20, 6, 3), 10.0);
    let map = compute_fluctuation_map(&frames);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overlay.png");

    save_overlay(
        &path,
        &frames.frames()[0].data,
        &map,
        &[RoiCoords::new(1, 1, 5, 5)],
    )
    .unwrap();
    let img = image::open(&path).unwrap();
    assert_eq!((img.width(), img.height()), (20, 12));
}

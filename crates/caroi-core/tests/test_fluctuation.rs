mod common;

use caroi_core::fluctuation::compute_fluctuation_map;
use common::{blinking_square_frames, buffer, constant_frames, exponential_decay_frames, random_frames};

#[test]
fn test_constant_video_gives_zero_map() {
    let frames = buffer(constant_frames(8, 8, 20, 0.5), 10.0);
    let map = compute_fluctuation_map(&frames);
    assert_eq!(map.scores.dim(), (8, 8));
    assert!(map.scores.iter().all(|&v| v == 0.0));
}

#[test]
fn test_pure_bleaching_is_detrended_away() {
    // Uniform decay is entirely global trend; nothing should stand out.
    let frames = buffer(exponential_decay_frames(6, 6, 40, 10.0, 1.0, 50.0), 10.0);
    let map = compute_fluctuation_map(&frames);
    assert!(map.scores.iter().all(|v| v.is_finite()));
    assert!(map.raw_max < 1e-3);
}

#[test]
fn test_blinking_region_scores_highest() {
    let frames = buffer(blinking_square_frames(20, 20, 30, 0.2, 0.5, (5, 7, 3)), 10.0);
    let map = compute_fluctuation_map(&frames);

    assert!(map.scores[[6, 8]] > 0.99);
    assert!(map.scores[[15, 15]] < 0.01);
    assert!(map.scores.iter().all(|&v| (0.0..=1.0).contains(&v)));
}

#[test]
fn test_single_frame_is_all_zero() {
    let frames = buffer(random_frames(5, 5, 1, 3), 1.0);
    let map = compute_fluctuation_map(&frames);
    assert!(map.scores.iter().all(|&v| v == 0.0));
}

#[test]
fn test_random_map_is_normalized() {
    let frames = buffer(random_frames(16, 16, 25, 11), 10.0);
    let map = compute_fluctuation_map(&frames);
    let max = map.scores.iter().copied().fold(f32::MIN, f32::max);
    let min = map.scores.iter().copied().fold(f32::MAX, f32::min);
    assert!((max - 1.0).abs() < 1e-6);
    assert!(min.abs() < 1e-6);
    assert!(map.percentile(50.0) > 0.0);
}

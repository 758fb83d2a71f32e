#![allow(dead_code)]

use caroi_core::frame::FrameBuffer;
use caroi_core::io::ser::SER_HEADER_SIZE;
use ndarray::Array2;

/// Build a SER file header.
///
/// `color_id`: 0=MONO, 8=BAYER_RGGB, 100=RGB, 101=BGR
pub fn build_ser_header(
    width: u32,
    height: u32,
    bit_depth: u32,
    num_frames: usize,
    color_id: i32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SER_HEADER_SIZE);

    buf.extend_from_slice(b"LUCAM-RECORDER");
    buf.extend_from_slice(&0i32.to_le_bytes()); // LuID
    buf.extend_from_slice(&color_id.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes()); // little-endian
    buf.extend_from_slice(&(width as i32).to_le_bytes());
    buf.extend_from_slice(&(height as i32).to_le_bytes());
    buf.extend_from_slice(&(bit_depth as i32).to_le_bytes());
    buf.extend_from_slice(&(num_frames as i32).to_le_bytes());
    buf.extend_from_slice(&[0u8; 40]); // observer
    let mut instrument = [0u8; 40];
    instrument[..6].copy_from_slice(b"Scope1");
    buf.extend_from_slice(&instrument);
    buf.extend_from_slice(&[0u8; 40]); // telescope
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());

    assert_eq!(buf.len(), SER_HEADER_SIZE);
    buf
}

/// Complete mono 8-bit SER file, optionally with a timestamp trailer.
pub fn build_ser(width: u32, height: u32, frames: &[Vec<u8>], timestamps: Option<&[u64]>) -> Vec<u8> {
    let mut buf = build_ser_header(width, height, 8, frames.len(), 0);
    for frame in frames {
        buf.extend_from_slice(frame);
    }
    if let Some(ts) = timestamps {
        for t in ts {
            buf.extend_from_slice(&t.to_le_bytes());
        }
    }
    buf
}

/// Write bytes to a temporary file that lives as long as the handle.
pub fn write_temp(data: &[u8], suffix: &str) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut f = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    f.write_all(data).expect("write data");
    f.flush().expect("flush");
    f
}

/// Minimal deterministic generator so tests need no RNG crate.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32) / (1u64 << 24) as f32
    }
}

pub fn constant_frames(h: usize, w: usize, n: usize, value: f32) -> Vec<Array2<f32>> {
    (0..n).map(|_| Array2::from_elem((h, w), value)).collect()
}

pub fn random_frames(h: usize, w: usize, n: usize, seed: u64) -> Vec<Array2<f32>> {
    let mut rng = Lcg::new(seed);
    (0..n)
        .map(|_| Array2::from_shape_fn((h, w), |_| rng.next_f32()))
        .collect()
}

/// Every pixel follows `a * exp(-t / b)` sampled at `fps`.
pub fn exponential_decay_frames(
    h: usize,
    w: usize,
    n: usize,
    fps: f64,
    a: f64,
    b: f64,
) -> Vec<Array2<f32>> {
    (0..n)
        .map(|i| {
            let t = i as f64 / fps;
            Array2::from_elem((h, w), (a * (-t / b).exp()) as f32)
        })
        .collect()
}

pub fn buffer(frames: Vec<Array2<f32>>, fps: f64) -> FrameBuffer {
    FrameBuffer::from_arrays(frames, fps).expect("valid frames")
}

/// Uniform background of `base` with a square of side `size` at
/// (`row`, `col`) that alternates between `base` and `base + amplitude`.
pub fn blinking_square_frames(
    h: usize,
    w: usize,
    n: usize,
    base: f32,
    amplitude: f32,
    (row, col, size): (usize, usize, usize),
) -> Vec<Array2<f32>> {
    (0..n)
        .map(|i| {
            let mut f = Array2::from_elem((h, w), base);
            if i % 2 == 1 {
                for r in row..(row + size).min(h) {
                    for c in col..(col + size).min(w) {
                        f[[r, c]] = base + amplitude;
                    }
                }
            }
            f
        })
        .collect()
}

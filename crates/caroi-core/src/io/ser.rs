use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R, SER_TICKS_PER_SECOND};
use crate::error::{CaroiError, Result};
use crate::frame::{ColorMode, Frame, FrameBuffer, FrameMetadata, SourceInfo};

pub const SER_HEADER_SIZE: usize = 178;
pub const SER_MAGIC: &[u8; 14] = b"LUCAM-RECORDER";

/// SER file header (178 bytes).
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    pub little_endian: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    pub date_time: u64,
    pub date_time_utc: u64,
}

impl SerHeader {
    /// Bytes per sample (1 for 8-bit, 2 for 9-16 bit).
    pub fn bytes_per_sample(&self) -> usize {
        if self.pixel_depth <= 8 {
            1
        } else {
            2
        }
    }

    /// Samples per pixel (1 for mono/bayer, 3 for RGB/BGR).
    pub fn planes_per_pixel(&self) -> usize {
        match self.color_id {
            100 | 101 => 3,
            _ => 1,
        }
    }

    pub fn color_mode(&self) -> ColorMode {
        match self.color_id {
            8..=19 => ColorMode::Bayer,
            100 => ColorMode::RGB,
            101 => ColorMode::BGR,
            _ => ColorMode::Mono,
        }
    }

    fn frame_byte_size(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|px| px.checked_mul(self.bytes_per_sample() * self.planes_per_pixel()))
            .ok_or_else(|| CaroiError::InvalidSer("frame size overflows".into()))
    }
}

/// Memory-mapped SER recording.
///
/// Samples are normalized to [0, 1] by the header's bit depth. Color
/// recordings are reduced to luminance; Bayer data is read as a single
/// mono plane without demosaicing.
pub struct SerReader {
    mmap: Mmap,
    frame_bytes: usize,
    pub header: SerHeader,
}

impl SerReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and the file is not modified while open.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < SER_HEADER_SIZE {
            return Err(CaroiError::InvalidSer(
                "file too small for SER header".into(),
            ));
        }
        if &mmap[0..14] != SER_MAGIC {
            return Err(CaroiError::InvalidSer(
                "missing LUCAM-RECORDER magic".into(),
            ));
        }

        let header = parse_header(&mmap[..SER_HEADER_SIZE])?;
        let frame_bytes = header.frame_byte_size()?;
        let expected = frame_bytes
            .checked_mul(header.frame_count as usize)
            .and_then(|b| b.checked_add(SER_HEADER_SIZE))
            .ok_or_else(|| CaroiError::InvalidSer("data size overflows".into()))?;
        if mmap.len() < expected {
            return Err(CaroiError::InvalidSer(format!(
                "file truncated: expected at least {} bytes, got {}",
                expected,
                mmap.len()
            )));
        }

        debug!(
            width = header.width,
            height = header.height,
            depth = header.pixel_depth,
            frames = header.frame_count,
            color = ?header.color_mode(),
            "SER header parsed"
        );

        Ok(Self {
            mmap,
            frame_bytes,
            header,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let count = self.frame_count();
        if index >= count {
            return Err(CaroiError::FrameIndexOutOfRange {
                index,
                total: count,
            });
        }
        let offset = SER_HEADER_SIZE + index * self.frame_bytes;
        Ok(&self.mmap[offset..offset + self.frame_bytes])
    }

    /// Decode one frame as normalized intensity.
    pub fn read_frame(&self, index: usize) -> Result<Frame> {
        let raw = self.frame_raw(index)?;
        let h = self.header.height as usize;
        let w = self.header.width as usize;
        let sample = SampleFormat {
            bytes: self.header.bytes_per_sample(),
            max: ((1u32 << self.header.pixel_depth) - 1) as f32,
            little_endian: self.header.little_endian,
        };

        let data = match self.header.color_mode() {
            ColorMode::RGB => decode_luminance(raw, h, w, &sample, [0, 1, 2]),
            ColorMode::BGR => decode_luminance(raw, h, w, &sample, [2, 1, 0]),
            ColorMode::Mono | ColorMode::Bayer => {
                Array2::from_shape_fn((h, w), |(r, c)| sample.read(raw, r * w + c))
            }
        };

        let mut frame = Frame::new(data, self.header.pixel_depth as u8);
        frame.metadata = FrameMetadata {
            frame_index: index,
            timestamp_us: self.timestamp_ticks(index).map(|t| t / 10),
        };
        Ok(frame)
    }

    /// Per-frame timestamp from the optional trailer, in 100 ns ticks.
    pub fn timestamp_ticks(&self, index: usize) -> Option<u64> {
        let trailer = SER_HEADER_SIZE + self.frame_bytes * self.frame_count();
        let offset = trailer + index * 8;
        let bytes = self.mmap.get(offset..offset + 8)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Frame rate derived from the timestamp trailer, when present and
    /// strictly increasing overall.
    pub fn estimated_fps(&self) -> Option<f64> {
        let n = self.frame_count();
        if n < 2 {
            return None;
        }
        let first = self.timestamp_ticks(0)?;
        let last = self.timestamp_ticks(n - 1)?;
        if last <= first {
            return None;
        }
        let span_s = (last - first) as f64 / SER_TICKS_PER_SECOND;
        Some((n - 1) as f64 / span_s)
    }

    pub fn source_info(&self, path: &Path) -> SourceInfo {
        SourceInfo {
            filename: path.to_path_buf(),
            total_frames: self.frame_count(),
            width: self.header.width,
            height: self.header.height,
            bit_depth: self.header.pixel_depth as u8,
            color_mode: self.header.color_mode(),
            fps: self.estimated_fps(),
            instrument: non_empty(&self.header.instrument),
        }
    }

    /// Decode the whole recording into a [`FrameBuffer`].
    ///
    /// The frame rate comes from the timestamp trailer when available,
    /// otherwise `fallback_fps` is used.
    pub fn load(&self, fallback_fps: f64) -> Result<FrameBuffer> {
        let frames: Vec<Frame> = (0..self.frame_count())
            .into_par_iter()
            .map(|i| self.read_frame(i))
            .collect::<Result<_>>()?;
        let fps = self.estimated_fps().unwrap_or(fallback_fps);
        info!(frames = frames.len(), fps, "SER recording decoded");
        FrameBuffer::new(frames, fps)
    }
}

struct SampleFormat {
    bytes: usize,
    max: f32,
    little_endian: bool,
}

impl SampleFormat {
    /// Normalized value of the `sample`-th sample in `raw`.
    fn read(&self, raw: &[u8], sample: usize) -> f32 {
        let idx = sample * self.bytes;
        let v = if self.bytes == 1 {
            raw[idx] as f32
        } else {
            let pair = [raw[idx], raw[idx + 1]];
            if self.little_endian {
                u16::from_le_bytes(pair) as f32
            } else {
                u16::from_be_bytes(pair) as f32
            }
        };
        v / self.max
    }
}

/// `order` gives the sample offsets of R, G and B within a pixel.
fn decode_luminance(
    raw: &[u8],
    height: usize,
    width: usize,
    sample: &SampleFormat,
    order: [usize; 3],
) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(r, c)| {
        let base = (r * width + c) * 3;
        LUMINANCE_R * sample.read(raw, base + order[0])
            + LUMINANCE_G * sample.read(raw, base + order[1])
            + LUMINANCE_B * sample.read(raw, base + order[2])
    })
}

fn parse_header(buf: &[u8]) -> Result<SerHeader> {
    let mut cursor = std::io::Cursor::new(&buf[14..]);

    let _lu_id = cursor.read_i32::<LittleEndian>()?;
    let color_id = cursor.read_i32::<LittleEndian>()?;
    let le_flag = cursor.read_i32::<LittleEndian>()?;
    let width = cursor.read_i32::<LittleEndian>()? as u32;
    let height = cursor.read_i32::<LittleEndian>()? as u32;
    let pixel_depth = cursor.read_i32::<LittleEndian>()? as u32;
    let frame_count = cursor.read_i32::<LittleEndian>()? as u32;

    let observer = read_fixed_string(&buf[42..82]);
    let instrument = read_fixed_string(&buf[82..122]);
    let telescope = read_fixed_string(&buf[122..162]);

    let mut cursor = std::io::Cursor::new(&buf[162..]);
    let date_time = cursor.read_u64::<LittleEndian>()?;
    let date_time_utc = cursor.read_u64::<LittleEndian>()?;

    if width == 0 || height == 0 {
        return Err(CaroiError::InvalidDimensions { width, height });
    }
    if !(1..=16).contains(&pixel_depth) {
        return Err(CaroiError::InvalidSer(format!(
            "unsupported pixel depth {pixel_depth}"
        )));
    }

    // Writers disagree on the meaning of 0; only an explicit 1 is big-endian.
    let little_endian = le_flag != 1;

    Ok(SerHeader {
        color_id,
        little_endian,
        width,
        height,
        pixel_depth,
        frame_count,
        observer,
        instrument,
        telescope,
        date_time,
        date_time_utc,
    })
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

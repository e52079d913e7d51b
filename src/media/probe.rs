//! Video information from container headers.
//!
//! Only headers are read; no frames are decoded. MP4/MOV/M4V, Matroska/WebM
//! and AVI are understood, everything else reports a decode error and the
//! caller falls back to [`VideoInfo::default`].

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{debug, trace, warn};

use crate::error::{CatalogError, CatalogResult};

/// How much of the file head (and tail, for MP4) is scanned.
const SCAN_WINDOW: u64 = 256 * 1024;

/// Frame rate reported when the header carries none.
pub const DEFAULT_FPS: f64 = 30.0;

/// Basic properties of a video file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    pub frame_count: u64,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for VideoInfo {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            frame_count: 0,
            duration_secs: 0.0,
            width: 0,
            height: 0,
        }
    }
}

impl VideoInfo {
    pub fn resolution_label(&self) -> String {
        if self.width == 0 || self.height == 0 {
            "-".to_string()
        } else {
            format!("{}x{}", self.width, self.height)
        }
    }

    /// Duration as `m:ss`.
    pub fn duration_label(&self) -> String {
        let total = self.duration_secs.max(0.0).round() as u64;
        format!("{}:{:02}", total / 60, total % 60)
    }
}

/// Source of video information and frames.
///
/// Implementations must be shareable with the import workers.
pub trait MediaDecoder: Send + Sync {
    fn probe(&self, path: &Path) -> CatalogResult<VideoInfo>;

    /// Decodes the frame shown `secs` seconds into the video.
    fn frame_at(&self, path: &Path, secs: f64) -> CatalogResult<RgbImage>;
}

/// Probes a file, degrading to default values on any failure.
pub fn video_info_or_default(decoder: &dyn MediaDecoder, path: &Path) -> VideoInfo {
    match decoder.probe(path) {
        Ok(info) => info,
        Err(e) => {
            warn!("Could not read video info for {:?}: {}", path, e);
            VideoInfo::default()
        }
    }
}

/// Header-only decoder. Reports sizes, duration and frame rate where the
/// container stores them; cannot produce frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderProbe;

impl MediaDecoder for HeaderProbe {
    fn probe(&self, path: &Path) -> CatalogResult<VideoInfo> {
        probe_headers(path).map_err(|e| CatalogError::MediaDecode(format!("{e:#}")))
    }

    fn frame_at(&self, path: &Path, _secs: f64) -> CatalogResult<RgbImage> {
        Err(CatalogError::MediaDecode(format!(
            "no frame decoder available for {}",
            path.display()
        )))
    }
}

/// Fields a container header may or may not carry.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct HeaderFields {
    width: u32,
    height: u32,
    duration_secs: Option<f64>,
    fps: Option<f64>,
    frame_count: Option<u64>,
}

impl HeaderFields {
    fn into_info(self) -> VideoInfo {
        let fps = self.fps.filter(|f| *f > 0.0).unwrap_or(DEFAULT_FPS);
        let frame_count = self
            .frame_count
            .or_else(|| self.duration_secs.map(|d| (d * fps).round() as u64))
            .unwrap_or(0);
        let duration_secs = self
            .duration_secs
            .unwrap_or_else(|| frame_count as f64 / fps);

        VideoInfo {
            fps,
            frame_count,
            duration_secs,
            width: self.width,
            height: self.height,
        }
    }
}

fn probe_headers(path: &Path) -> Result<VideoInfo> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let fields = match ext.as_str() {
        "mp4" | "mov" | "m4v" => parse_mp4(&read_mp4_window(path)?),
        "mkv" | "webm" => parse_matroska(&read_head(path)?),
        "avi" => parse_avi(&read_head(path)?),
        _ => bail!("no header parser for .{ext} files"),
    };

    if fields.width == 0 || fields.height == 0 {
        bail!("no video dimensions found in {:?}", path);
    }

    let info = fields.into_info();
    debug!(?path, ?info, "Probed video headers");
    Ok(info)
}

fn read_head(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("Failed to open video: {:?}", path))?;
    let mut buffer = Vec::new();
    file.take(SCAN_WINDOW)
        .read_to_end(&mut buffer)
        .with_context(|| format!("Failed to read video header: {:?}", path))?;
    Ok(buffer)
}

/// Head of the file, plus its tail when the `moov` box is not up front.
fn read_mp4_window(path: &Path) -> Result<Vec<u8>> {
    let mut buffer = read_head(path)?;
    if find(&buffer, b"moov", 0).is_some() {
        return Ok(buffer);
    }

    let mut file = File::open(path).with_context(|| format!("Failed to open video: {:?}", path))?;
    let len = file.metadata()?.len();
    if len > SCAN_WINDOW {
        let start = (len - SCAN_WINDOW).max(SCAN_WINDOW);
        file.seek(SeekFrom::Start(start))?;
        file.take(SCAN_WINDOW).read_to_end(&mut buffer)?;
        trace!(?path, "Scanning MP4 tail for moov");
    }
    Ok(buffer)
}

fn find(buffer: &[u8], tag: &[u8], from: usize) -> Option<usize> {
    if from >= buffer.len() {
        return None;
    }
    buffer[from..]
        .windows(tag.len())
        .position(|w| w == tag)
        .map(|i| i + from)
}

fn be_u32(buffer: &[u8], at: usize) -> Option<u32> {
    let bytes = buffer.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn be_u64(buffer: &[u8], at: usize) -> Option<u64> {
    let hi = be_u32(buffer, at)? as u64;
    let lo = be_u32(buffer, at + 4)? as u64;
    Some((hi << 32) | lo)
}

fn le_u32(buffer: &[u8], at: usize) -> Option<u32> {
    let bytes = buffer.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Timescale and duration of an `mvhd` or `mdhd` box whose tag sits at `at`.
fn box_timing(buffer: &[u8], at: usize) -> Option<(u32, u64)> {
    let version = *buffer.get(at + 4)?;
    if version == 1 {
        Some((be_u32(buffer, at + 24)?, be_u64(buffer, at + 28)?))
    } else {
        Some((be_u32(buffer, at + 16)?, be_u32(buffer, at + 20)? as u64))
    }
}

/// Width and height of a `tkhd` box, stored as 16.16 fixed point.
fn track_size(buffer: &[u8], at: usize) -> Option<(u32, u32)> {
    let version = *buffer.get(at + 4)?;
    let offset = if version == 1 { at + 92 } else { at + 80 };
    let width = be_u32(buffer, offset)? >> 16;
    let height = be_u32(buffer, offset + 4)? >> 16;
    Some((width, height))
}

fn parse_mp4(buffer: &[u8]) -> HeaderFields {
    let mut fields = HeaderFields::default();

    if let Some(at) = find(buffer, b"mvhd", 0) {
        if let Some((timescale, duration)) = box_timing(buffer, at).filter(|(t, _)| *t > 0) {
            fields.duration_secs = Some(duration as f64 / timescale as f64);
        }
    }

    // The first track with a size is the video track; audio tracks are 0x0
    let mut from = 0;
    while let Some(at) = find(buffer, b"tkhd", from) {
        from = at + 4;
        let Some((width, height)) = track_size(buffer, at) else {
            break;
        };
        if width == 0 || height == 0 || width >= 65536 || height >= 65536 {
            continue;
        }
        fields.width = width;
        fields.height = height;

        // Sample table of the same track: mdhd timescale, first stts entry
        let mdhd = find(buffer, b"mdhd", at).and_then(|m| box_timing(buffer, m));
        let stts = find(buffer, b"stts", at);
        if let (Some((timescale, _)), Some(stts)) = (mdhd, stts) {
            let entries = be_u32(buffer, stts + 8).unwrap_or(0) as usize;
            let first_delta = be_u32(buffer, stts + 16).unwrap_or(0);
            if timescale > 0 && first_delta > 0 {
                fields.fps = Some(timescale as f64 / first_delta as f64);
            }
            let frames: u64 = (0..entries.min(4096))
                .map_while(|i| be_u32(buffer, stts + 12 + i * 8))
                .map(u64::from)
                .sum();
            if frames > 0 {
                fields.frame_count = Some(frames);
            }
        }
        break;
    }

    trace!(?fields, "MP4 header fields");
    fields
}

/// Matroska stores pixel sizes as EBML elements 0xB0 and 0xBA inside the
/// video track entry. This is a pattern scan, not a full EBML parser.
fn parse_matroska(buffer: &[u8]) -> HeaderFields {
    let mut fields = HeaderFields::default();

    for i in 0..buffer.len().saturating_sub(2) {
        let target = match buffer[i] {
            0xB0 if fields.width == 0 => &mut fields.width,
            0xBA if fields.height == 0 => &mut fields.height,
            _ => continue,
        };
        if let Some(value) = read_ebml_uint(&buffer[i + 1..]) {
            *target = value;
        }
        if fields.width > 0 && fields.height > 0 {
            break;
        }
    }

    trace!(?fields, "Matroska header fields");
    fields
}

/// Reads a size-prefixed EBML unsigned integer of at most 4 bytes.
fn read_ebml_uint(data: &[u8]) -> Option<u32> {
    let first = *data.first()?;
    // One-byte size marker: 0x80 | len
    if first & 0x80 == 0 {
        return None;
    }
    let len = (first & 0x7F) as usize;
    if len == 0 || len > 4 {
        return None;
    }
    let bytes = data.get(1..1 + len)?;
    let value = bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
    (value > 0 && value < 65536).then_some(value)
}

/// AVI keeps frame timing and size in the `avih` main header, and the
/// bitmap size again in the video stream's `strf` chunk.
fn parse_avi(buffer: &[u8]) -> HeaderFields {
    let mut fields = HeaderFields::default();

    if let Some(at) = find(buffer, b"avih", 0) {
        let body = at + 8;
        let usec_per_frame = le_u32(buffer, body).unwrap_or(0);
        let total_frames = le_u32(buffer, body + 16).unwrap_or(0);
        if usec_per_frame > 0 {
            let fps = 1_000_000.0 / usec_per_frame as f64;
            fields.fps = Some(fps);
            if total_frames > 0 {
                fields.frame_count = Some(total_frames as u64);
                fields.duration_secs = Some(total_frames as f64 / fps);
            }
        }
        fields.width = le_u32(buffer, body + 32).unwrap_or(0);
        fields.height = le_u32(buffer, body + 36).unwrap_or(0);
    }

    if fields.width == 0 || fields.height == 0 {
        if let Some(at) = find(buffer, b"strf", 0) {
            let header = at + 8;
            let width = le_u32(buffer, header + 4).unwrap_or(0) as i32;
            let height = le_u32(buffer, header + 8).unwrap_or(0) as i32;
            // Negative height marks a top-down bitmap
            fields.width = width.unsigned_abs();
            fields.height = height.unsigned_abs();
        }
    }

    trace!(?fields, "AVI header fields");
    fields
}

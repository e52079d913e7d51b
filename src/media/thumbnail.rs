//! Video thumbnails: one frame, scaled to fit 320x240 and saved as JPEG.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::{debug, warn};

use super::probe::MediaDecoder;

/// Bounding box for generated thumbnails.
pub const THUMB_MAX_SIZE: (u32, u32) = (320, 240);

/// Where in the video the thumbnail frame is taken, in seconds.
pub const THUMB_FRAME_TIME: f64 = 0.0;

const JPEG_QUALITY: u8 = 85;

/// Placeholder background and play-mark colors.
const PLACEHOLDER_BG: Rgb<u8> = Rgb([0x37, 0x41, 0x51]);
const PLACEHOLDER_MARK: Rgb<u8> = Rgb([0x9C, 0xA3, 0xAF]);

/// How a thumbnail file came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailKind {
    Frame { width: u32, height: u32 },
    Placeholder,
}

pub struct ThumbnailGenerator;

impl ThumbnailGenerator {
    /// Writes a thumbnail for `video` to `dst`.
    ///
    /// A frame that cannot be decoded is not an error: a placeholder image is
    /// written instead. Only failing to write `dst` is.
    pub fn generate(
        decoder: &dyn MediaDecoder,
        video: &Path,
        dst: &Path,
    ) -> Result<ThumbnailKind> {
        let frame = match decoder.frame_at(video, THUMB_FRAME_TIME) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Using placeholder thumbnail for {:?}: {}", video, e);
                Self::write_jpeg(&DynamicImage::ImageRgb8(Self::placeholder(THUMB_MAX_SIZE)), dst)?;
                return Ok(ThumbnailKind::Placeholder);
            }
        };

        let frame = DynamicImage::ImageRgb8(frame);
        let (src_width, src_height) = frame.dimensions();
        let (width, height) = fit_within(src_width, src_height, THUMB_MAX_SIZE);
        let thumbnail = if (width, height) == (src_width, src_height) {
            frame
        } else {
            frame.resize_exact(width, height, FilterType::Triangle)
        };

        Self::write_jpeg(&thumbnail, dst)?;
        debug!(?video, ?dst, width, height, "Generated thumbnail");
        Ok(ThumbnailKind::Frame { width, height })
    }

    /// A flat card with a centered play triangle.
    pub fn placeholder((width, height): (u32, u32)) -> RgbImage {
        let mut img = RgbImage::from_pixel(width.max(1), height.max(1), PLACEHOLDER_BG);
        let size = width.min(height) / 3;
        let left = width.saturating_sub(size) / 2;
        let top = height.saturating_sub(size) / 2;

        for dx in 0..size {
            // Triangle pointing right: column dx spans a shrinking band
            let half = (size - dx) / 2;
            let mid = top + size / 2;
            for y in mid.saturating_sub(half)..=(mid + half).min(height.saturating_sub(1)) {
                img.put_pixel(left + dx, y, PLACEHOLDER_MARK);
            }
        }
        img
    }

    pub(crate) fn write_jpeg(img: &DynamicImage, dst: &Path) -> Result<()> {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create thumbnail directory: {:?}", parent))?;
        }

        let file = File::create(dst)
            .with_context(|| format!("Failed to create thumbnail file: {:?}", dst))?;
        let mut writer = BufWriter::new(file);

        // JPEG has no alpha channel
        let rgb = img.to_rgb8();
        let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
        rgb.write_with_encoder(encoder)
            .with_context(|| format!("Failed to encode thumbnail: {:?}", dst))?;
        Ok(())
    }
}

/// Largest size with the source aspect ratio that fits `bounds`.
/// Never upscales.
pub fn fit_within(src_width: u32, src_height: u32, bounds: (u32, u32)) -> (u32, u32) {
    let (max_width, max_height) = bounds;
    if src_width == 0 || src_height == 0 {
        return (max_width, max_height);
    }
    if src_width <= max_width && src_height <= max_height {
        return (src_width, src_height);
    }

    let (w, h) = (src_width as u64, src_height as u64);
    let (bw, bh) = (max_width as u64, max_height as u64);
    if w * bh > bw * h {
        let height = (bw * h / w) as u32;
        (max_width, height.max(1))
    } else {
        let width = (bh * w / h) as u32;
        (width.max(1), max_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CatalogError, CatalogResult};
    use crate::media::probe::{HeaderProbe, VideoInfo};
    use tempfile::TempDir;

    /// Decoder returning a solid frame of a fixed size.
    struct SolidFrames(u32, u32);

    impl MediaDecoder for SolidFrames {
        fn probe(&self, _path: &Path) -> CatalogResult<VideoInfo> {
            Ok(VideoInfo {
                width: self.0,
                height: self.1,
                ..VideoInfo::default()
            })
        }

        fn frame_at(&self, _path: &Path, _secs: f64) -> CatalogResult<RgbImage> {
            if self.0 == 0 {
                return Err(CatalogError::MediaDecode("empty".into()));
            }
            Ok(RgbImage::from_pixel(self.0, self.1, Rgb([200, 10, 10])))
        }
    }

    #[test]
    fn test_fit_within() {
        // Wide source is bounded by width
        assert_eq!(fit_within(1920, 1080, (320, 240)), (320, 180));
        // Tall source is bounded by height
        assert_eq!(fit_within(1080, 1920, (320, 240)), (135, 240));
        // Small source is left alone
        assert_eq!(fit_within(200, 100, (320, 240)), (200, 100));
        assert_eq!(fit_within(0, 100, (320, 240)), (320, 240));
    }

    #[test]
    fn test_generate_from_frame() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("thumb/thumb_clip.jpg");

        let kind =
            ThumbnailGenerator::generate(&SolidFrames(1280, 720), Path::new("clip.mp4"), &dst)
                .unwrap();
        assert_eq!(kind, ThumbnailKind::Frame { width: 320, height: 180 });

        let written = image::open(&dst).unwrap();
        assert_eq!(written.dimensions(), (320, 180));
    }

    #[test]
    fn test_decode_failure_writes_placeholder() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("thumb_clip.jpg");

        let kind = ThumbnailGenerator::generate(&HeaderProbe, Path::new("clip.mp4"), &dst).unwrap();
        assert_eq!(kind, ThumbnailKind::Placeholder);
        assert_eq!(image::open(&dst).unwrap().dimensions(), THUMB_MAX_SIZE);

        let kind =
            ThumbnailGenerator::generate(&SolidFrames(0, 0), Path::new("clip.mp4"), &dst).unwrap();
        assert_eq!(kind, ThumbnailKind::Placeholder);
    }

    #[test]
    fn test_placeholder_has_mark() {
        let img = ThumbnailGenerator::placeholder((90, 60));
        assert_eq!(img.dimensions(), (90, 60));
        assert_eq!(*img.get_pixel(0, 0), PLACEHOLDER_BG);
        assert_eq!(*img.get_pixel(45 - 10, 30), PLACEHOLDER_MARK);
    }
}

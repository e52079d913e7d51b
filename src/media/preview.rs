//! Decoded card previews with a byte-bounded LRU.
//!
//! Keys are an xxh3 hash of (kind, record id, updated_at), so editing a record
//! naturally misses the old entry. Anything that fails to decode is cached as
//! a placeholder; decode errors never reach the grid.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use lru::LruCache;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::models::{MediaKind, MediaRecord};

use super::thumbnail::{fit_within, ThumbnailGenerator};

/// Preview bounding box on a card.
pub const PREVIEW_SIZE: (u32, u32) = (240, 200);

const DEFAULT_MAX_MEMORY_MB: usize = 64;
const MIN_MEMORY_MB: usize = 8;
const MAX_MEMORY_MB: usize = 512;
const BYTES_PER_PIXEL: usize = 4;
const DEFAULT_LRU_CAPACITY: usize = 1024;

/// A decoded preview ready for display.
#[derive(Debug, Clone)]
pub struct Preview {
    pub image: RgbaImage,
    /// True when the source could not be decoded.
    pub is_placeholder: bool,
}

impl Preview {
    fn memory_bytes(&self) -> usize {
        self.image.width() as usize * self.image.height() as usize * BYTES_PER_PIXEL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewKey(u64);

impl PreviewKey {
    pub fn new(kind: MediaKind, record_id: i64, updated_at: i64) -> Self {
        let mut data = Vec::with_capacity(17);
        data.push(match kind {
            MediaKind::Image => 0u8,
            MediaKind::Video => 1u8,
        });
        data.extend_from_slice(&record_id.to_le_bytes());
        data.extend_from_slice(&updated_at.to_le_bytes());
        Self(xxh3_64(&data))
    }

    pub fn for_record(record: &MediaRecord) -> Self {
        Self::new(
            record.kind(),
            record.id().unwrap_or_default(),
            record.updated_at(),
        )
    }
}

struct Entries {
    lru: LruCache<PreviewKey, Arc<Preview>>,
    bytes: usize,
}

/// Shared preview cache. Clones share the same entries.
#[derive(Clone)]
pub struct PreviewCache {
    max_memory_bytes: usize,
    entries: Arc<RwLock<Entries>>,
}

impl Default for PreviewCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MEMORY_MB)
    }
}

impl PreviewCache {
    pub fn new(max_memory_mb: usize) -> Self {
        let max_memory_mb = max_memory_mb.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB);
        Self::with_byte_limit(max_memory_mb * 1024 * 1024)
    }

    /// Cache bounded by an exact byte count. Used by tests.
    pub fn with_byte_limit(max_memory_bytes: usize) -> Self {
        Self::with_limits(max_memory_bytes, DEFAULT_LRU_CAPACITY)
    }

    /// Cache bounded by both a byte count and an entry count.
    pub fn with_limits(max_memory_bytes: usize, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        debug!(max_memory_bytes, "Initialized preview cache");
        Self {
            max_memory_bytes,
            entries: Arc::new(RwLock::new(Entries {
                lru: LruCache::new(capacity),
                bytes: 0,
            })),
        }
    }

    /// Preview for a record, decoding and caching it on a miss.
    pub fn get_or_load(&self, record: &MediaRecord) -> Arc<Preview> {
        let key = PreviewKey::for_record(record);
        if let Some(hit) = self.entries.write().lru.get(&key).cloned() {
            trace!(record_id = ?record.id(), "Preview cache hit");
            return hit;
        }

        let preview = Arc::new(match record {
            MediaRecord::Image(image) => decode_preview(image::load_from_memory(&image.payload)),
            MediaRecord::Video(video) => match video.thumbnail_path.as_deref() {
                Some(path) => decode_file(path),
                None => placeholder(),
            },
        });
        if preview.is_placeholder {
            warn!(record_id = ?record.id(), kind = %record.kind(), "Preview fell back to placeholder");
        }

        self.insert(key, Arc::clone(&preview));
        preview
    }

    pub fn contains(&self, record: &MediaRecord) -> bool {
        self.entries.read().lru.contains(&PreviewKey::for_record(record))
    }

    pub fn remove(&self, record: &MediaRecord) -> bool {
        let mut entries = self.entries.write();
        match entries.lru.pop(&PreviewKey::for_record(record)) {
            Some(old) => {
                entries.bytes = entries.bytes.saturating_sub(old.memory_bytes());
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.lru.clear();
        entries.bytes = 0;
    }

    pub fn memory_usage(&self) -> usize {
        self.entries.read().bytes
    }

    pub fn len(&self) -> usize {
        self.entries.read().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: PreviewKey, preview: Arc<Preview>) {
        let size = preview.memory_bytes();
        let mut entries = self.entries.write();

        while entries.bytes + size > self.max_memory_bytes {
            match entries.lru.pop_lru() {
                Some((_, evicted)) => {
                    entries.bytes = entries.bytes.saturating_sub(evicted.memory_bytes());
                    trace!(evicted_bytes = evicted.memory_bytes(), "Evicted preview");
                }
                None => break,
            }
        }

        // `push` hands back either the replaced value for `key` or the entry
        // dropped by the count cap; both leave the byte total.
        if let Some((_, old)) = entries.lru.push(key, preview) {
            entries.bytes = entries.bytes.saturating_sub(old.memory_bytes());
        }
        entries.bytes += size;
    }
}

fn decode_file(path: &Path) -> Preview {
    decode_preview(image::open(path))
}

fn decode_preview(decoded: image::ImageResult<DynamicImage>) -> Preview {
    match decoded {
        Ok(img) => {
            let (width, height) = img.dimensions();
            let (w, h) = fit_within(width, height, PREVIEW_SIZE);
            let img = if (w, h) == (width, height) {
                img
            } else {
                img.resize_exact(w, h, FilterType::Triangle)
            };
            Preview {
                image: img.to_rgba8(),
                is_placeholder: false,
            }
        }
        Err(e) => {
            debug!("Preview decode failed: {}", e);
            placeholder()
        }
    }
}

fn placeholder() -> Preview {
    let img = DynamicImage::ImageRgb8(ThumbnailGenerator::placeholder(PREVIEW_SIZE));
    Preview {
        image: img.to_rgba8(),
        is_placeholder: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageRecord, VideoRecord};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn image_record(id: i64, payload: Vec<u8>) -> MediaRecord {
        let mut record = ImageRecord::new(1, "a", payload);
        record.id = Some(id);
        record.updated_at = 100;
        record.into()
    }

    #[test]
    fn test_key_changes_with_updated_at() {
        let a = PreviewKey::new(MediaKind::Image, 1, 100);
        assert_eq!(a, PreviewKey::new(MediaKind::Image, 1, 100));
        assert_ne!(a, PreviewKey::new(MediaKind::Image, 1, 101));
        assert_ne!(a, PreviewKey::new(MediaKind::Video, 1, 100));
    }

    #[test]
    fn test_image_preview_is_fitted_and_cached() {
        let cache = PreviewCache::default();
        let record = image_record(1, png_bytes(480, 200));

        let preview = cache.get_or_load(&record);
        assert!(!preview.is_placeholder);
        assert_eq!(preview.image.dimensions(), (240, 100));
        assert!(cache.contains(&record));
        assert_eq!(cache.memory_usage(), 240 * 100 * 4);

        let again = cache.get_or_load(&record);
        assert!(Arc::ptr_eq(&preview, &again));
    }

    #[test]
    fn test_undecodable_sources_use_placeholder() {
        let cache = PreviewCache::default();
        let broken = image_record(1, b"not an image".to_vec());
        assert!(cache.get_or_load(&broken).is_placeholder);

        let mut video = VideoRecord::new(1, PathBuf::from("/v/a.mp4"), None);
        video.id = Some(2);
        assert!(cache.get_or_load(&video.into()).is_placeholder);

        let mut video = VideoRecord::new(1, PathBuf::from("/v/a.mp4"), Some("/missing.jpg".into()));
        video.id = Some(3);
        let preview = cache.get_or_load(&video.into());
        assert!(preview.is_placeholder);
        assert_eq!(preview.image.dimensions(), PREVIEW_SIZE);
    }

    #[test]
    fn test_byte_limit_evicts_least_recent() {
        let one = 100 * 100 * 4;
        let cache = PreviewCache::with_byte_limit(one * 2);
        let a = image_record(1, png_bytes(100, 100));
        let b = image_record(2, png_bytes(100, 100));
        let c = image_record(3, png_bytes(100, 100));

        cache.get_or_load(&a);
        cache.get_or_load(&b);
        // Touch a so b is the least recent
        cache.get_or_load(&a);
        cache.get_or_load(&c);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert_eq!(cache.memory_usage(), one * 2);

        assert!(cache.remove(&a));
        assert_eq!(cache.memory_usage(), one);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entry_cap_eviction_releases_bytes() {
        let cache = PreviewCache::default();
        let payload = png_bytes(1, 1);
        for id in 0..1100 {
            cache.get_or_load(&image_record(id, payload.clone()));
        }

        assert_eq!(cache.len(), DEFAULT_LRU_CAPACITY);
        assert_eq!(cache.memory_usage(), DEFAULT_LRU_CAPACITY * BYTES_PER_PIXEL);
        assert!(!cache.contains(&image_record(0, payload.clone())));
        assert!(cache.contains(&image_record(1099, payload)));
    }

    #[test]
    fn test_reloading_same_key_does_not_double_count() {
        let cache = PreviewCache::with_limits(usize::MAX, 2);
        let a = image_record(1, png_bytes(10, 10));
        cache.get_or_load(&a);
        cache.remove(&a);
        cache.get_or_load(&a);
        cache.get_or_load(&image_record(2, png_bytes(10, 10)));
        cache.get_or_load(&image_record(3, png_bytes(10, 10)));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.memory_usage(), 2 * 10 * 10 * 4);
    }
}

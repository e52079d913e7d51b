use std::path::{Path, PathBuf};

use super::campus::MediaKind;

/// Position value meaning "unassigned, allocate on save".
pub const UNASSIGNED_POSITION: i64 = 0;

/// An image stored inline as a binary payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// `None` until the record has been inserted.
    pub id: Option<i64>,
    pub campus_id: i64,
    pub name: String,
    pub payload: Vec<u8>,
    pub position: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ImageRecord {
    /// A new, unsaved image whose position will be allocated on save.
    pub fn new(campus_id: i64, name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: None,
            campus_id,
            name: name.into(),
            payload,
            position: UNASSIGNED_POSITION,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }
}

/// A video referenced by its copied file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    pub id: Option<i64>,
    pub campus_id: i64,
    pub file_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub position: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl VideoRecord {
    pub fn new(campus_id: i64, file_path: PathBuf, thumbnail_path: Option<PathBuf>) -> Self {
        Self {
            id: None,
            campus_id,
            file_path,
            thumbnail_path,
            position: UNASSIGNED_POSITION,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    /// File name shown on the card.
    pub fn display_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string())
    }
}

/// Either media variant, as placed in a grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRecord {
    Image(ImageRecord),
    Video(VideoRecord),
}

impl MediaRecord {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Image(_) => MediaKind::Image,
            Self::Video(_) => MediaKind::Video,
        }
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Image(r) => r.id,
            Self::Video(r) => r.id,
        }
    }

    pub fn campus_id(&self) -> i64 {
        match self {
            Self::Image(r) => r.campus_id,
            Self::Video(r) => r.campus_id,
        }
    }

    pub fn position(&self) -> i64 {
        match self {
            Self::Image(r) => r.position,
            Self::Video(r) => r.position,
        }
    }

    pub fn set_position(&mut self, position: i64) {
        match self {
            Self::Image(r) => r.position = position,
            Self::Video(r) => r.position = position,
        }
    }

    pub fn updated_at(&self) -> i64 {
        match self {
            Self::Image(r) => r.updated_at,
            Self::Video(r) => r.updated_at,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::Image(r) => r.name.clone(),
            Self::Video(r) => r.display_name(),
        }
    }

    /// Thumbnail on disk, videos only.
    pub fn thumbnail_path(&self) -> Option<&Path> {
        match self {
            Self::Image(_) => None,
            Self::Video(r) => r.thumbnail_path.as_deref(),
        }
    }
}

impl From<ImageRecord> for MediaRecord {
    fn from(record: ImageRecord) -> Self {
        Self::Image(record)
    }
}

impl From<VideoRecord> for MediaRecord {
    fn from(record: VideoRecord) -> Self {
        Self::Video(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_records_are_unassigned() {
        let image = ImageRecord::new(1, "cat", vec![1, 2, 3]);
        assert_eq!(image.id, None);
        assert_eq!(image.position, UNASSIGNED_POSITION);

        let video = VideoRecord::new(2, PathBuf::from("/v/2_clip.mp4"), None).with_position(4);
        assert_eq!(video.position, 4);
    }

    #[test]
    fn test_media_record_accessors() {
        let mut record: MediaRecord = VideoRecord::new(3, PathBuf::from("/v/3_a.mkv"), None).into();
        assert_eq!(record.kind(), MediaKind::Video);
        assert_eq!(record.campus_id(), 3);
        assert_eq!(record.display_name(), "3_a.mkv");

        record.set_position(9);
        assert_eq!(record.position(), 9);
    }
}

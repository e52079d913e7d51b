use std::fmt;
use std::path::Path;

/// Media kind a campus is fixed to. Decides which record table it reads and
/// whether its grid has a capacity ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

/// Fixed capacity of an image campus (a 5x3 grid).
pub const IMAGE_CAPACITY: i64 = 15;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v"];

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// Number of grid positions, `None` when the grid grows without bound.
    pub fn capacity(self) -> Option<i64> {
        match self {
            Self::Image => Some(IMAGE_CAPACITY),
            Self::Video => None,
        }
    }

    /// Extensions accepted by the file picker for this kind.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Image => IMAGE_EXTENSIONS,
            Self::Video => VIDEO_EXTENSIONS,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Checks a picked path against this kind's allow-list.
    pub fn accepts(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            == Some(self)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named container of media, fixed to one [`MediaKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campus {
    pub id: i64,
    pub name: String,
    pub kind: MediaKind,
    pub created_at: i64,
    pub updated_at: i64,
}

//! On-disk locations of the catalog.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use tracing::debug;

const APP_NAME: &str = "campus-grid";
const DATABASE_FILE: &str = "database.db";
const MAX_NAME_SUFFIX: u32 = 10_000;

/// Data directory layout:
///
/// ```text
/// <data>/database.db
/// <data>/videos/video/<campus>_<file name>     (or <campus>_<stem>_<n>.<ext>)
/// <data>/videos/thumbnail/thumb_<stem>.jpg
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    /// Platform data directory (XDG data home on Linux).
    pub fn from_project_dirs() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", APP_NAME)
            .context("Failed to determine project directories")?;
        Ok(Self::with_root(dirs.data_dir()))
    }

    /// Everything under `root`. Used by tests and portable installs.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: root.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.data_dir.join("videos").join("video")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.data_dir.join("videos").join("thumbnail")
    }

    /// Creates the data, video and thumbnail directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.videos_dir(), self.thumbnails_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        }
        debug!(data_dir = ?self.data_dir, "Data directories ready");
        Ok(())
    }

    /// Where an uploaded video is copied to.
    pub fn video_destination(&self, campus_id: i64, source: &Path) -> Option<PathBuf> {
        let name = source.file_name()?.to_string_lossy();
        Some(self.videos_dir().join(format!("{campus_id}_{name}")))
    }

    /// Reserves `path`, or the first free `<stem>_<n>.<ext>` next to it, by
    /// creating it empty. Two uploads of the same file name never share a
    /// copy, even when they race on different workers.
    pub fn claim_file(path: &Path) -> Result<PathBuf> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

        for n in 0..MAX_NAME_SUFFIX {
            let candidate = if n == 0 {
                path.to_path_buf()
            } else {
                let name = match &ext {
                    Some(ext) => format!("{stem}_{n}.{ext}"),
                    None => format!("{stem}_{n}"),
                };
                path.with_file_name(name)
            };

            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create file: {:?}", candidate))
                }
            }
        }
        bail!("No free file name left for {:?}", path)
    }

    /// Thumbnail file for a copied video.
    pub fn thumbnail_destination(&self, video: &Path) -> Option<PathBuf> {
        let stem = video.file_stem()?.to_string_lossy();
        Some(self.thumbnails_dir().join(format!("thumb_{stem}.jpg")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let paths = AppPaths::with_root("/data");
        assert_eq!(paths.db_path(), PathBuf::from("/data/database.db"));
        assert_eq!(paths.videos_dir(), PathBuf::from("/data/videos/video"));
        assert_eq!(paths.thumbnails_dir(), PathBuf::from("/data/videos/thumbnail"));

        let copied = paths
            .video_destination(7, Path::new("/home/me/Movies/trip.mp4"))
            .unwrap();
        assert_eq!(copied, PathBuf::from("/data/videos/video/7_trip.mp4"));
        assert_eq!(
            paths.thumbnail_destination(&copied),
            Some(PathBuf::from("/data/videos/thumbnail/thumb_7_trip.jpg"))
        );
        assert_eq!(paths.video_destination(7, Path::new("/")), None);
    }

    #[test]
    fn test_claim_file_never_reuses_a_name() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("7_trip.mp4");

        assert_eq!(AppPaths::claim_file(&base).unwrap(), base);
        assert_eq!(
            AppPaths::claim_file(&base).unwrap(),
            temp.path().join("7_trip_1.mp4")
        );
        assert_eq!(
            AppPaths::claim_file(&base).unwrap(),
            temp.path().join("7_trip_2.mp4")
        );
        assert!(AppPaths::claim_file(&temp.path().join("missing/dir.mp4")).is_err());
    }

    #[test]
    fn test_ensure_dirs() {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::with_root(temp.path().join("nested"));
        paths.ensure_dirs().unwrap();
        assert!(paths.videos_dir().is_dir());
        assert!(paths.thumbnails_dir().is_dir());
        // Idempotent
        paths.ensure_dirs().unwrap();
    }
}

//! Campus, image and video operations on top of the store.
//!
//! `Library` bundles a store handle with the data directory and a media
//! decoder. File copies, thumbnails and position allocation happen here; the
//! store only sees finished rows.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AppPaths;
use crate::error::{CatalogError, CatalogResult};
use crate::grid::{GridContext, GridSession, PositionAllocator};
use crate::media::{video_info_or_default, MediaDecoder, ThumbnailGenerator, VideoInfo};
use crate::models::{
    Campus, CascadeReport, CatalogStore, ImageRecord, MediaKind, VideoRecord,
};

pub struct Library {
    store: CatalogStore,
    paths: AppPaths,
    decoder: Arc<dyn MediaDecoder>,
}

impl Library {
    /// Creates the data directories and opens the database under `paths`.
    pub fn open(paths: AppPaths, decoder: Arc<dyn MediaDecoder>) -> CatalogResult<Self> {
        paths.ensure_dirs().map_err(internal)?;
        let store = CatalogStore::open(&paths.db_path())?;
        Ok(Self::new(store, paths, decoder))
    }

    pub fn new(store: CatalogStore, paths: AppPaths, decoder: Arc<dyn MediaDecoder>) -> Self {
        Self {
            store,
            paths,
            decoder,
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CatalogStore {
        &mut self.store
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Opens the grid of a campus.
    pub fn open_grid(
        &self,
        campus_id: i64,
        window_width: i32,
        context: GridContext,
    ) -> CatalogResult<GridSession> {
        GridSession::load(&self.store, campus_id, window_width, context)
    }

    // =========================================================================
    // Campuses
    // =========================================================================

    /// Newest first.
    pub fn list_campuses(&self) -> CatalogResult<Vec<Campus>> {
        self.store.list_campuses()
    }

    pub fn campus(&self, id: i64) -> CatalogResult<Campus> {
        self.store
            .get_campus(id)?
            .ok_or_else(|| CatalogError::not_found("campus", id))
    }

    pub fn create_campus(&self, name: &str, kind: MediaKind) -> CatalogResult<Campus> {
        let name = required_name(name, "campus name")?;
        let campus = self.store.insert_campus(name, kind)?;
        info!(id = campus.id, name, %kind, "Created campus");
        Ok(campus)
    }

    /// Renames a campus. Returns `false` when the name did not change.
    /// The media kind is fixed at creation and never edited.
    pub fn rename_campus(&self, id: i64, name: &str) -> CatalogResult<bool> {
        let name = required_name(name, "campus name")?;
        let campus = self.campus(id)?;
        if campus.name == name {
            debug!(id, "Campus name unchanged");
            return Ok(false);
        }
        if !self.store.rename_campus(id, name)? {
            return Err(CatalogError::not_found("campus", id));
        }
        Ok(true)
    }

    /// Deletes a campus and all of its records, then removes the copied
    /// video and thumbnail files. File removal failures are only logged.
    pub fn delete_campus(&mut self, id: i64) -> CatalogResult<CascadeReport> {
        let report = self
            .store
            .delete_campus_cascade(id)?
            .ok_or_else(|| CatalogError::not_found("campus", id))?;

        for video in &report.videos_deleted {
            remove_video_files(video);
        }
        Ok(report)
    }

    // =========================================================================
    // Images
    // =========================================================================

    pub fn list_images(&self, campus_id: i64) -> CatalogResult<Vec<ImageRecord>> {
        self.store.list_images(campus_id)
    }

    pub fn image(&self, id: i64) -> CatalogResult<ImageRecord> {
        self.store
            .get_image(id)?
            .ok_or_else(|| CatalogError::not_found("image", id))
    }

    /// Reads an image file into a new record.
    ///
    /// `name` defaults to the file stem; a `position` of 0 is allocated.
    pub fn upload_image(
        &self,
        campus_id: i64,
        source: &Path,
        name: Option<&str>,
        position: i64,
    ) -> CatalogResult<ImageRecord> {
        ensure_accepts(MediaKind::Image, source)?;
        let payload = fs::read(source)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => file_stem(source),
        };

        let mut image = ImageRecord::new(campus_id, name, payload).with_position(position);
        PositionAllocator::new(&self.store).save_image(&mut image)?;
        self.reread_image(image)
    }

    /// Changes name and/or position. Nothing is written if either is invalid.
    pub fn edit_image(
        &self,
        id: i64,
        name: Option<&str>,
        position: Option<i64>,
    ) -> CatalogResult<ImageRecord> {
        let mut image = self.image(id)?;
        if let Some(name) = name {
            image.name = name.to_string();
        }
        if let Some(position) = position {
            image.position = position;
        }
        PositionAllocator::new(&self.store).save_image(&mut image)?;
        self.reread_image(image)
    }

    /// Replaces the stored payload with the contents of `source`.
    pub fn replace_image(&self, id: i64, source: &Path) -> CatalogResult<ImageRecord> {
        ensure_accepts(MediaKind::Image, source)?;
        let mut image = self.image(id)?;
        image.payload = fs::read(source)?;
        PositionAllocator::new(&self.store).save_image(&mut image)?;
        self.reread_image(image)
    }

    pub fn delete_image(&self, id: i64) -> CatalogResult<()> {
        if !self.store.delete_image(id)? {
            return Err(CatalogError::not_found("image", id));
        }
        debug!(id, "Deleted image");
        Ok(())
    }

    // =========================================================================
    // Videos
    // =========================================================================

    pub fn list_videos(&self, campus_id: i64) -> CatalogResult<Vec<VideoRecord>> {
        self.store.list_videos(campus_id)
    }

    pub fn video(&self, id: i64) -> CatalogResult<VideoRecord> {
        self.store
            .get_video(id)?
            .ok_or_else(|| CatalogError::not_found("video", id))
    }

    /// Copies a video into the data directory, writes its thumbnail and
    /// inserts the record. Copied files are removed again if the insert fails.
    pub fn upload_video(
        &self,
        campus_id: i64,
        source: &Path,
        position: i64,
    ) -> CatalogResult<VideoRecord> {
        ensure_accepts(MediaKind::Video, source)?;
        let campus = self.campus(campus_id)?;
        if campus.kind != MediaKind::Video {
            return Err(CatalogError::validation(format!(
                "campus {} holds {} media, not video",
                campus.id, campus.kind
            )));
        }

        let (file_path, thumbnail_path) = self.import_video_file(campus_id, source)?;
        let mut video = VideoRecord::new(campus_id, file_path, Some(thumbnail_path))
            .with_position(position);

        if let Err(e) = PositionAllocator::new(&self.store).save_video(&mut video) {
            remove_video_files(&video);
            return Err(e);
        }
        info!(id = ?video.id, campus_id, position = video.position, "Uploaded video");
        self.reread_video(video)
    }

    pub fn edit_video_position(&self, id: i64, position: i64) -> CatalogResult<VideoRecord> {
        let mut video = self.video(id)?;
        video.position = position;
        PositionAllocator::new(&self.store).save_video(&mut video)?;
        self.reread_video(video)
    }

    /// Swaps in a new source file. The old copy and thumbnail are removed
    /// once the record points at the new ones.
    pub fn replace_video(&self, id: i64, source: &Path) -> CatalogResult<VideoRecord> {
        ensure_accepts(MediaKind::Video, source)?;
        let mut video = self.video(id)?;
        let old = video.clone();

        let (file_path, thumbnail_path) = self.import_video_file(video.campus_id, source)?;
        video.file_path = file_path;
        video.thumbnail_path = Some(thumbnail_path);
        if let Err(e) = PositionAllocator::new(&self.store).save_video(&mut video) {
            remove_video_files(&video);
            return Err(e);
        }

        if old.file_path != video.file_path {
            remove_file_best_effort(&old.file_path);
        }
        if let Some(thumb) = old.thumbnail_path.as_deref() {
            if video.thumbnail_path.as_deref() != Some(thumb) {
                remove_file_best_effort(thumb);
            }
        }
        self.reread_video(video)
    }

    /// Removes the video's files, then its row.
    pub fn delete_video(&self, id: i64) -> CatalogResult<()> {
        let video = self.video(id)?;
        remove_video_files(&video);
        self.store.delete_video(id)?;
        debug!(id, "Deleted video");
        Ok(())
    }

    /// Frame rate, length and size of a stored video. Unreadable files yield
    /// default values rather than an error.
    pub fn video_info(&self, id: i64) -> CatalogResult<VideoInfo> {
        let video = self.video(id)?;
        Ok(video_info_or_default(self.decoder.as_ref(), &video.file_path))
    }

    /// Copies `source` to a destination no other record uses and writes its
    /// thumbnail. Same-named uploads get a numbered copy.
    fn import_video_file(&self, campus_id: i64, source: &Path) -> CatalogResult<(PathBuf, PathBuf)> {
        let preferred = self
            .paths
            .video_destination(campus_id, source)
            .ok_or_else(|| CatalogError::validation("video path has no file name"))?;
        if let Some(parent) = preferred.parent() {
            fs::create_dir_all(parent)?;
        }

        let file_path = AppPaths::claim_file(&preferred).map_err(internal)?;
        let thumbnail_path = match self.paths.thumbnail_destination(&file_path) {
            Some(path) => path,
            None => {
                remove_file_best_effort(&file_path);
                return Err(CatalogError::validation("video path has no file name"));
            }
        };

        if let Err(e) = fs::copy(source, &file_path) {
            remove_file_best_effort(&file_path);
            return Err(e.into());
        }
        debug!(?source, dest = ?file_path, "Copied video");

        if let Err(e) =
            ThumbnailGenerator::generate(self.decoder.as_ref(), &file_path, &thumbnail_path)
        {
            remove_file_best_effort(&file_path);
            return Err(internal(e));
        }
        Ok((file_path, thumbnail_path))
    }

    fn reread_image(&self, image: ImageRecord) -> CatalogResult<ImageRecord> {
        match image.id {
            Some(id) => self.image(id),
            None => Ok(image),
        }
    }

    fn reread_video(&self, video: VideoRecord) -> CatalogResult<VideoRecord> {
        match video.id {
            Some(id) => self.video(id),
            None => Ok(video),
        }
    }
}

fn required_name<'a>(name: &'a str, what: &str) -> CatalogResult<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::validation(format!("{what} must not be empty")));
    }
    Ok(name)
}

fn ensure_accepts(kind: MediaKind, path: &Path) -> CatalogResult<()> {
    if kind.accepts(path) {
        return Ok(());
    }
    Err(CatalogError::validation(format!(
        "{} is not a supported {kind} file",
        path.display()
    )))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn remove_video_files(video: &VideoRecord) {
    remove_file_best_effort(&video.file_path);
    if let Some(thumb) = video.thumbnail_path.as_deref() {
        remove_file_best_effort(thumb);
    }
}

fn remove_file_best_effort(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(?path, "Removed file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}

/// Internal plumbing errors surface as I/O failures.
fn internal(e: anyhow::Error) -> CatalogError {
    CatalogError::Io(std::io::Error::other(format!("{e:#}")))
}

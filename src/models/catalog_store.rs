//! SQLite-backed record store for campuses and their media.
//!
//! This module provides the `CatalogStore` struct which owns all database
//! operations for the catalog:
//! - Campus rows (name, fixed media kind)
//! - Image rows (inline payload, position constrained to 1..=15, unique per campus)
//! - Video rows (copied file path, thumbnail path, loosely ordered position)
//!
//! Every statement auto-commits except position rewrites, which run inside a
//! single transaction so a swap can never leave a record parked on the sentinel.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{Campus, ImageRecord, MediaKind, MediaRecord, VideoRecord};

/// Temporary position used while two records exchange slots.
///
/// The image table's CHECK constraint admits it so the UNIQUE(campus_id,
/// position) constraint holds at every step of a swap.
pub const SWAP_SENTINEL_POSITION: i64 = -1;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const IMAGE_COLUMNS: &str = "id, campus_id, name, payload, position, created_at, updated_at";
const VIDEO_COLUMNS: &str =
    "id, campus_id, file_path, thumbnail_path, position, created_at, updated_at";

/// SQLite-backed storage for campuses, images and videos.
///
/// Each handle owns one connection. Background workers open their own handle
/// on the same file; WAL mode keeps readers and the single writer apart.
pub struct CatalogStore {
    conn: Connection,
}

/// A single position write, applied in order by [`CatalogStore::write_positions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionWrite {
    pub record_id: i64,
    pub position: i64,
}

/// Rows removed by a campus delete.
#[derive(Debug, Clone, Default)]
pub struct CascadeReport {
    pub images_deleted: usize,
    /// Deleted video rows, so the caller can remove their files.
    pub videos_deleted: Vec<VideoRecord>,
}

impl CatalogStore {
    /// Opens or creates the database at the specified path.
    ///
    /// Configures SQLite with:
    /// - journal_mode = WAL (workers write while the UI thread reads)
    /// - synchronous = NORMAL
    /// - foreign_keys = ON (records must point at an existing campus)
    pub fn open(path: &Path) -> CatalogResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let store = Self { conn };
        store.create_tables()?;

        info!("Opened catalog store at {:?}", path);
        Ok(store)
    }

    /// Opens a private in-memory database. Used by tests and previews.
    pub fn open_in_memory() -> CatalogResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    /// Creates the database schema if it doesn't exist.
    fn create_tables(&self) -> CatalogResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS campus (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('image', 'video')),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Fixed 15-slot grid; -1 is only ever seen inside a swap transaction
            CREATE TABLE IF NOT EXISTS image (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campus_id INTEGER NOT NULL REFERENCES campus(id),
                name TEXT NOT NULL,
                payload BLOB NOT NULL,
                position INTEGER NOT NULL
                    CHECK (position = -1 OR (position >= 1 AND position <= 15)),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (campus_id, position)
            );

            -- Open-ended grid; positions are not unique
            CREATE TABLE IF NOT EXISTS video (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campus_id INTEGER NOT NULL REFERENCES campus(id),
                file_path TEXT NOT NULL,
                thumbnail_path TEXT,
                position INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_video_campus_position
                ON video(campus_id, position);
            ",
        )?;

        debug!("Catalog tables created/verified");
        Ok(())
    }

    /// Raw connection, for tests that need to inject triggers.
    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    // =========================================================================
    // Campus Operations
    // =========================================================================

    pub fn insert_campus(&self, name: &str, kind: MediaKind) -> CatalogResult<Campus> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO campus (name, kind, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, kind.as_str(), now],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, name, %kind, "Inserted campus");

        Ok(Campus {
            id,
            name: name.to_string(),
            kind,
            created_at: now,
            updated_at: now,
        })
    }

    /// All campuses, newest first.
    pub fn list_campuses(&self) -> CatalogResult<Vec<Campus>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, kind, created_at, updated_at
             FROM campus ORDER BY created_at DESC, id DESC",
        )?;
        let campuses = stmt
            .query_map([], campus_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(campuses)
    }

    pub fn get_campus(&self, id: i64) -> CatalogResult<Option<Campus>> {
        let campus = self
            .conn
            .query_row(
                "SELECT id, name, kind, created_at, updated_at FROM campus WHERE id = ?1",
                params![id],
                campus_from_row,
            )
            .optional()?;
        Ok(campus)
    }

    /// Renames a campus. The kind column is never rewritten.
    pub fn rename_campus(&self, id: i64, name: &str) -> CatalogResult<bool> {
        let rows = self.conn.execute(
            "UPDATE campus SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![name, Self::now(), id],
        )?;
        Ok(rows > 0)
    }

    /// Deletes a campus together with all of its records in one transaction.
    ///
    /// Returns `None` if the campus did not exist.
    pub fn delete_campus_cascade(&mut self, id: i64) -> CatalogResult<Option<CascadeReport>> {
        let tx = self.conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row("SELECT id FROM campus WHERE id = ?1", params![id], |r| {
                r.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        let videos_deleted = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {VIDEO_COLUMNS} FROM video WHERE campus_id = ?1"
            ))?;
            let rows = stmt
                .query_map(params![id], video_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let images_deleted = tx.execute("DELETE FROM image WHERE campus_id = ?1", params![id])?;
        tx.execute("DELETE FROM video WHERE campus_id = ?1", params![id])?;
        tx.execute("DELETE FROM campus WHERE id = ?1", params![id])?;
        tx.commit()?;

        info!(
            campus_id = id,
            images_deleted,
            videos_deleted = videos_deleted.len(),
            "Deleted campus"
        );

        Ok(Some(CascadeReport {
            images_deleted,
            videos_deleted,
        }))
    }

    // =========================================================================
    // Image Operations
    // =========================================================================

    /// Inserts an image and returns its new id. The position must already be
    /// resolved; the table constraints reject anything else.
    pub fn insert_image(&self, image: &ImageRecord) -> CatalogResult<i64> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO image (campus_id, name, payload, position, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![image.campus_id, image.name, image.payload, image.position, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_image(&self, image: &ImageRecord) -> CatalogResult<bool> {
        let Some(id) = image.id else {
            return Ok(false);
        };
        let rows = self.conn.execute(
            "UPDATE image SET name = ?1, payload = ?2, position = ?3, updated_at = ?4
             WHERE id = ?5",
            params![image.name, image.payload, image.position, Self::now(), id],
        )?;
        Ok(rows > 0)
    }

    pub fn get_image(&self, id: i64) -> CatalogResult<Option<ImageRecord>> {
        let image = self
            .conn
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM image WHERE id = ?1"),
                params![id],
                image_from_row,
            )
            .optional()?;
        Ok(image)
    }

    /// Images of a campus in grid order.
    pub fn list_images(&self, campus_id: i64) -> CatalogResult<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {IMAGE_COLUMNS} FROM image WHERE campus_id = ?1
             ORDER BY position ASC, created_at DESC, id ASC"
        ))?;
        let images = stmt
            .query_map(params![campus_id], image_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(images)
    }

    pub fn delete_image(&self, id: i64) -> CatalogResult<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM image WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // =========================================================================
    // Video Operations
    // =========================================================================

    pub fn insert_video(&self, video: &VideoRecord) -> CatalogResult<i64> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO video (campus_id, file_path, thumbnail_path, position, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                video.campus_id,
                video.file_path.to_string_lossy(),
                video
                    .thumbnail_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                video.position,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_video(&self, video: &VideoRecord) -> CatalogResult<bool> {
        let Some(id) = video.id else {
            return Ok(false);
        };
        let rows = self.conn.execute(
            "UPDATE video SET file_path = ?1, thumbnail_path = ?2, position = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                video.file_path.to_string_lossy(),
                video
                    .thumbnail_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                video.position,
                Self::now(),
                id,
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn get_video(&self, id: i64) -> CatalogResult<Option<VideoRecord>> {
        let video = self
            .conn
            .query_row(
                &format!("SELECT {VIDEO_COLUMNS} FROM video WHERE id = ?1"),
                params![id],
                video_from_row,
            )
            .optional()?;
        Ok(video)
    }

    /// Videos of a campus in grid order. Duplicated positions keep the newest
    /// record first.
    pub fn list_videos(&self, campus_id: i64) -> CatalogResult<Vec<VideoRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VIDEO_COLUMNS} FROM video WHERE campus_id = ?1
             ORDER BY position ASC, created_at DESC, id ASC"
        ))?;
        let videos = stmt
            .query_map(params![campus_id], video_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(videos)
    }

    pub fn delete_video(&self, id: i64) -> CatalogResult<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM video WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // =========================================================================
    // Position Operations
    // =========================================================================

    /// All records of a campus in grid order, as the variant matching `kind`.
    pub fn list_records(&self, kind: MediaKind, campus_id: i64) -> CatalogResult<Vec<MediaRecord>> {
        let records = match kind {
            MediaKind::Image => self
                .list_images(campus_id)?
                .into_iter()
                .map(MediaRecord::Image)
                .collect(),
            MediaKind::Video => self
                .list_videos(campus_id)?
                .into_iter()
                .map(MediaRecord::Video)
                .collect(),
        };
        Ok(records)
    }

    /// Highest stored position in the campus, 0 when it is empty.
    pub fn max_position(&self, kind: MediaKind, campus_id: i64) -> CatalogResult<i64> {
        let max: i64 = self.conn.query_row(
            &format!(
                "SELECT COALESCE(MAX(position), 0) FROM {} WHERE campus_id = ?1",
                table_name(kind)
            ),
            params![campus_id],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Distinct positions in use, ascending.
    pub fn occupied_positions(&self, kind: MediaKind, campus_id: i64) -> CatalogResult<Vec<i64>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT DISTINCT position FROM {} WHERE campus_id = ?1 ORDER BY position",
            table_name(kind)
        ))?;
        let positions = stmt
            .query_map(params![campus_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(positions)
    }

    /// Id of the record at `position`, following grid order on duplicates.
    pub fn occupant(
        &self,
        kind: MediaKind,
        campus_id: i64,
        position: i64,
    ) -> CatalogResult<Option<i64>> {
        let id = self
            .conn
            .query_row(
                &format!(
                    "SELECT id FROM {} WHERE campus_id = ?1 AND position = ?2
                     ORDER BY created_at DESC, id ASC LIMIT 1",
                    table_name(kind)
                ),
                params![campus_id, position],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Applies position writes in order inside one transaction.
    ///
    /// Either every write lands or none does. Each write must hit exactly one
    /// row in `campus_id`, otherwise the transaction is rolled back and
    /// `NotFound` is returned.
    pub fn write_positions(
        &mut self,
        kind: MediaKind,
        campus_id: i64,
        writes: &[PositionWrite],
    ) -> CatalogResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let now = Self::now();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "UPDATE {} SET position = ?1, updated_at = ?2 WHERE id = ?3 AND campus_id = ?4",
                table_name(kind)
            ))?;
            for write in writes {
                let rows = stmt.execute(params![write.position, now, write.record_id, campus_id])?;
                if rows == 0 {
                    // Dropping the transaction rolls back earlier writes
                    return Err(CatalogError::not_found(kind.as_str(), write.record_id));
                }
            }
        }
        tx.commit()?;

        debug!(%kind, campus_id, writes = writes.len(), "Committed position writes");
        Ok(())
    }

    // =========================================================================
    // Utility Methods
    // =========================================================================

    /// Returns the current Unix timestamp.
    pub fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Gets database statistics for debugging.
    pub fn get_stats(&self) -> CatalogResult<DbStats> {
        let campus_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM campus", [], |r| r.get(0))?;
        let image_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM image", [], |r| r.get(0))?;
        let video_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM video", [], |r| r.get(0))?;
        let page_count: i64 = self.conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let page_size: i64 = self.conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;

        Ok(DbStats {
            campus_count,
            image_count,
            video_count,
            db_size_bytes: page_count * page_size,
        })
    }
}

/// Database statistics for debugging and monitoring.
#[derive(Debug, Clone)]
pub struct DbStats {
    pub campus_count: i64,
    pub image_count: i64,
    pub video_count: i64,
    pub db_size_bytes: i64,
}

// =========================================================================
// Helper Functions
// =========================================================================

fn table_name(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image",
        MediaKind::Video => "video",
    }
}

fn campus_from_row(row: &Row<'_>) -> rusqlite::Result<Campus> {
    let kind: String = row.get(2)?;
    let kind = MediaKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown campus kind {kind:?}").into(),
        )
    })?;
    Ok(Campus {
        id: row.get(0)?,
        name: row.get(1)?,
        kind,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: Some(row.get(0)?),
        campus_id: row.get(1)?,
        name: row.get(2)?,
        payload: row.get(3)?,
        position: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<VideoRecord> {
    Ok(VideoRecord {
        id: Some(row.get(0)?),
        campus_id: row.get(1)?,
        file_path: PathBuf::from(row.get::<_, String>(2)?),
        thumbnail_path: row.get::<_, Option<String>>(3)?.map(PathBuf::from),
        position: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

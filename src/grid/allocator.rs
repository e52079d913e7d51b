//! Position allocation and validation for new and edited records.
//!
//! Every call re-queries the store; nothing is cached, so two writers racing
//! on the same campus can be handed the same slot. The image table's UNIQUE
//! constraint turns that race into a store error rather than a silent
//! duplicate.

use tracing::{debug, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    CatalogStore, Campus, ImageRecord, MediaKind, MediaRecord, VideoRecord, IMAGE_CAPACITY,
    UNASSIGNED_POSITION,
};

pub struct PositionAllocator<'a> {
    store: &'a CatalogStore,
}

impl<'a> PositionAllocator<'a> {
    pub fn new(store: &'a CatalogStore) -> Self {
        Self { store }
    }

    /// Proposes the position for a new record in `campus_id`.
    ///
    /// Video campuses get `max + 1`. Image campuses get the first free slot in
    /// `1..=15`, which is `max + 1` whenever the grid has no holes; when all
    /// fifteen are taken the answer is slot 1, the insert then collides and
    /// the store rejects it.
    pub fn next_position(&self, campus_id: i64) -> CatalogResult<i64> {
        let campus = self.campus(campus_id)?;
        let max = self.store.max_position(campus.kind, campus_id)?;
        let proposal = max.checked_add(1).ok_or_else(|| {
            CatalogError::validation(format!("no position left after {max} in campus {campus_id}"))
        })?;

        let Some(capacity) = campus.kind.capacity() else {
            return Ok(proposal);
        };

        let occupied = self.store.occupied_positions(campus.kind, campus_id)?;
        if let Some(position) = (1..=capacity).find(|p| occupied.binary_search(p).is_err()) {
            if position != proposal {
                debug!(campus_id, position, proposal, "Reusing first free image slot");
            }
            return Ok(position);
        }

        warn!(campus_id, "Image campus is full, falling back to slot 1");
        Ok(1)
    }

    /// Id of the record holding `position`, if any.
    pub fn occupant(
        &self,
        campus_id: i64,
        kind: MediaKind,
        position: i64,
    ) -> CatalogResult<Option<i64>> {
        self.store.occupant(kind, campus_id, position)
    }

    /// Checks a final (non-sentinel) position against the kind's domain.
    pub fn validate(kind: MediaKind, position: i64) -> CatalogResult<()> {
        match kind {
            MediaKind::Image if !(1..=IMAGE_CAPACITY).contains(&position) => {
                Err(CatalogError::validation(format!(
                    "position must be between 1 and {IMAGE_CAPACITY}, got {position}"
                )))
            }
            MediaKind::Video if position < 1 => Err(CatalogError::validation(format!(
                "position must be at least 1, got {position}"
            ))),
            _ => Ok(()),
        }
    }

    /// Inserts or updates a record, allocating its position when it is new and
    /// unassigned. Returns the record id and writes it back into `record`.
    pub fn save(&self, record: &mut MediaRecord) -> CatalogResult<i64> {
        match record {
            MediaRecord::Image(image) => self.save_image(image),
            MediaRecord::Video(video) => self.save_video(video),
        }
    }

    pub fn save_image(&self, image: &mut ImageRecord) -> CatalogResult<i64> {
        let name = image.name.trim();
        if name.is_empty() {
            return Err(CatalogError::validation("image name must not be empty"));
        }
        image.name = name.to_string();

        let campus = self.campus(image.campus_id)?;
        expect_kind(&campus, MediaKind::Image)?;

        match image.id {
            None => {
                if image.position == UNASSIGNED_POSITION {
                    image.position = self.next_position(image.campus_id)?;
                }
                Self::validate(MediaKind::Image, image.position)?;
                let id = self.store.insert_image(image)?;
                image.id = Some(id);
                debug!(id, campus_id = image.campus_id, position = image.position, "Created image");
                Ok(id)
            }
            Some(id) => {
                Self::validate(MediaKind::Image, image.position)?;
                if !self.store.update_image(image)? {
                    return Err(CatalogError::not_found("image", id));
                }
                Ok(id)
            }
        }
    }

    /// Videos are not range-checked beyond the unassigned sentinel: any
    /// position a user types in the edit form is stored as given.
    pub fn save_video(&self, video: &mut VideoRecord) -> CatalogResult<i64> {
        let campus = self.campus(video.campus_id)?;
        expect_kind(&campus, MediaKind::Video)?;

        match video.id {
            None => {
                if video.position == UNASSIGNED_POSITION {
                    video.position = self.next_position(video.campus_id)?;
                }
                let id = self.store.insert_video(video)?;
                video.id = Some(id);
                debug!(id, campus_id = video.campus_id, position = video.position, "Created video");
                Ok(id)
            }
            Some(id) => {
                if !self.store.update_video(video)? {
                    return Err(CatalogError::not_found("video", id));
                }
                Ok(id)
            }
        }
    }

    fn campus(&self, campus_id: i64) -> CatalogResult<Campus> {
        self.store
            .get_campus(campus_id)?
            .ok_or_else(|| CatalogError::not_found("campus", campus_id))
    }
}

fn expect_kind(campus: &Campus, kind: MediaKind) -> CatalogResult<()> {
    if campus.kind != kind {
        return Err(CatalogError::validation(format!(
            "campus {} holds {} media, not {}",
            campus.id, campus.kind, kind
        )));
    }
    Ok(())
}

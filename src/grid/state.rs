//! In-memory view of one campus grid, rebuilt from the store after every
//! commit.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::CatalogResult;
use crate::layout::{max_rows, position_to_cell};
use crate::models::{CatalogStore, CellState, GridCell, GridCoord, MediaKind, MediaRecord};

/// Which cells of a campus grid hold a record and which are free.
///
/// Positions are the stored ones; the column count only decides where each
/// position is drawn. Video records that share a position with an earlier
/// record are kept aside as collisions and drawn after the last occupied cell.
#[derive(Debug, Clone)]
pub struct GridState {
    kind: MediaKind,
    campus_id: i64,
    columns: usize,
    occupied: BTreeMap<i64, MediaRecord>,
    /// Free image slots. Always empty for video grids, whose holes are
    /// answered on demand by [`is_free`](Self::is_free).
    empty: BTreeSet<i64>,
    /// Records that lost their cell to an earlier record, in fetch order.
    collisions: Vec<MediaRecord>,
}

impl GridState {
    /// Builds the state from records in grid order (position ASC, newest
    /// first on ties). The first record at a position owns it.
    pub fn build(
        kind: MediaKind,
        campus_id: i64,
        records: Vec<MediaRecord>,
        columns: usize,
    ) -> Self {
        let mut occupied = BTreeMap::new();
        let mut collisions = Vec::new();

        for record in records {
            let position = record.position();
            let in_domain = match kind.capacity() {
                Some(capacity) => (1..=capacity).contains(&position),
                None => position >= 1,
            };

            if !in_domain || occupied.contains_key(&position) {
                warn!(
                    campus_id,
                    record_id = ?record.id(),
                    position,
                    "Record cannot take its stored cell, displaying it after the grid"
                );
                collisions.push(record);
                continue;
            }
            occupied.insert(position, record);
        }

        let mut state = Self {
            kind,
            campus_id,
            columns: columns.max(1),
            occupied,
            empty: BTreeSet::new(),
            collisions,
        };
        state.recompute_empty();

        debug!(
            %kind,
            campus_id,
            occupied = state.occupied.len(),
            empty = state.empty.len(),
            collisions = state.collisions.len(),
            columns = state.columns,
            "Built grid state"
        );
        state
    }

    /// Reads the campus's records from the store and builds a fresh state.
    pub fn load(
        store: &CatalogStore,
        kind: MediaKind,
        campus_id: i64,
        columns: usize,
    ) -> CatalogResult<Self> {
        let records = store.list_records(kind, campus_id)?;
        Ok(Self::build(kind, campus_id, records, columns))
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn campus_id(&self) -> i64 {
        self.campus_id
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.occupied.len() + self.collisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record owning `position`, displaced collisions excluded.
    pub fn occupant(&self, position: i64) -> Option<&MediaRecord> {
        self.occupied.get(&position)
    }

    pub fn is_occupied(&self, position: i64) -> bool {
        self.occupied.contains_key(&position)
    }

    /// Free slots of an image grid. Video grids have no explicit empty cells
    /// and always return an empty set here.
    pub fn empty_positions(&self) -> &BTreeSet<i64> {
        &self.empty
    }

    /// True when a drop onto `position` lands on a free cell: an untaken
    /// slot in `1..=15` for images, any untaken position for videos that is
    /// not drawn on by a displaced record.
    pub fn is_free(&self, position: i64) -> bool {
        match self.kind.capacity() {
            Some(_) => self.empty.contains(&position),
            None => {
                position >= 1
                    && !self.occupied.contains_key(&position)
                    && !self.displaced_range().contains(&position)
            }
        }
    }

    pub fn collisions(&self) -> &[MediaRecord] {
        &self.collisions
    }

    /// Occupied positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = i64> + '_ {
        self.occupied.keys().copied()
    }

    /// Rows drawn at the current column count.
    pub fn rows(&self) -> usize {
        let cells = match self.kind.capacity() {
            Some(capacity) => capacity as usize,
            None => self.last_display_position() as usize,
        };
        max_rows(self.columns, cells)
    }

    /// Cell a record is drawn in, including displaced ones.
    pub fn cell_of(&self, record_id: i64) -> Option<GridCoord> {
        self.display_positions()
            .find(|(_, record)| record.id() == Some(record_id))
            .and_then(|(position, _)| position_to_cell(position, self.columns))
    }

    /// Every renderable cell in position order.
    ///
    /// Image grids yield all fifteen cells with explicit empties. Video grids
    /// yield only occupied cells followed by displaced collisions; holes are
    /// skipped.
    pub fn cells(&self) -> Vec<GridCell> {
        let columns = self.columns;
        let occupied_cell = |position: i64, record: &MediaRecord| {
            let coord = position_to_cell(position, columns)?;
            Some(GridCell::new(
                coord,
                position,
                CellState::Occupied {
                    record_id: record.id().unwrap_or_default(),
                    stored_position: record.position(),
                },
            ))
        };

        match self.kind.capacity() {
            Some(capacity) => {
                let mut cells: Vec<GridCell> = (1..=capacity)
                    .filter_map(|position| match self.occupied.get(&position) {
                        Some(record) => occupied_cell(position, record),
                        None => position_to_cell(position, columns)
                            .map(|coord| GridCell::new(coord, position, CellState::Empty)),
                    })
                    .collect();
                // Out-of-range image rows never happen in a healthy store
                let mut next = capacity + 1;
                for record in &self.collisions {
                    cells.extend(occupied_cell(next, record));
                    next += 1;
                }
                cells
            }
            None => self
                .display_positions()
                .filter_map(|(position, record)| occupied_cell(position, record))
                .collect(),
        }
    }

    /// Redraws at a new column count. Stored positions are not touched.
    pub fn reproject(&mut self, columns: usize) {
        self.columns = columns.max(1);
    }

    /// Moves a record into a free position without reloading the store.
    ///
    /// Only video grids take this path. Returns `false` when the patch does
    /// not apply and the caller must reload instead.
    pub fn apply_simple_move(&mut self, record_id: i64, to: i64) -> bool {
        if self.kind != MediaKind::Video || to < 1 || self.occupied.contains_key(&to) {
            return false;
        }
        let Some(from) = self
            .occupied
            .iter()
            .find(|(_, record)| record.id() == Some(record_id))
            .map(|(&position, _)| position)
        else {
            return false;
        };

        if let Some(mut record) = self.occupied.remove(&from) {
            record.set_position(to);
            self.occupied.insert(to, record);
        }
        self.recompute_empty();
        debug!(campus_id = self.campus_id, record_id, from, to, "Patched video grid in place");
        true
    }

    /// Display position of every record: owners at their stored position,
    /// collisions packed after the last owner.
    fn display_positions(&self) -> impl Iterator<Item = (i64, &MediaRecord)> + '_ {
        let base = match self.kind.capacity() {
            Some(capacity) => capacity,
            None => self.last_owner(),
        };
        self.occupied
            .iter()
            .map(|(&position, record)| (position, record))
            .chain(
                self.collisions
                    .iter()
                    .enumerate()
                    .map(move |(i, record)| (base.saturating_add(1 + i as i64), record)),
            )
    }

    fn last_owner(&self) -> i64 {
        self.occupied.keys().next_back().copied().unwrap_or(0)
    }

    /// Stored positions have no upper bound for videos, so this saturates
    /// instead of overflowing next to `i64::MAX`.
    fn last_display_position(&self) -> i64 {
        self.last_owner()
            .saturating_add(self.collisions.len() as i64)
    }

    /// Video positions drawn on by displaced collisions.
    fn displaced_range(&self) -> std::ops::RangeInclusive<i64> {
        self.last_owner().saturating_add(1)..=self.last_display_position()
    }

    fn recompute_empty(&mut self) {
        self.empty = match self.kind.capacity() {
            Some(capacity) => (1..=capacity)
                .filter(|position| !self.occupied.contains_key(position))
                .collect(),
            None => BTreeSet::new(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageRecord, VideoRecord};
    use std::path::PathBuf;

    fn image(id: i64, position: i64) -> MediaRecord {
        let mut record = ImageRecord::new(1, format!("img{id}"), vec![]).with_position(position);
        record.id = Some(id);
        record.into()
    }

    fn video(id: i64, position: i64) -> MediaRecord {
        let mut record =
            VideoRecord::new(1, PathBuf::from(format!("/v/{id}.mp4")), None).with_position(position);
        record.id = Some(id);
        record.into()
    }

    #[test]
    fn test_image_grid_materializes_empties() {
        let state = GridState::build(
            MediaKind::Image,
            1,
            vec![image(10, 1), image(11, 3), image(12, 15)],
            5,
        );

        assert_eq!(state.len(), 3);
        assert_eq!(state.rows(), 3);
        assert_eq!(state.empty_positions().len(), 12);
        assert!(state.empty_positions().contains(&2));
        assert!(!state.empty_positions().contains(&3));

        let cells = state.cells();
        assert_eq!(cells.len(), 15);
        assert_eq!(cells[1].state, CellState::Empty);
        assert_eq!(cells[2].record_id(), Some(11));
        assert_eq!(cells[14].coord, GridCoord::new(2, 4));
    }

    #[test]
    fn test_image_rows_follow_columns() {
        let mut state = GridState::build(MediaKind::Image, 1, vec![image(1, 1)], 4);
        assert_eq!(state.rows(), 4);
        state.reproject(2);
        assert_eq!(state.rows(), 8);
        assert_eq!(state.cells().len(), 15);
    }

    #[test]
    fn test_video_grid_skips_gaps_when_rendering() {
        let state = GridState::build(
            MediaKind::Video,
            1,
            vec![video(1, 1), video(2, 2), video(3, 6)],
            4,
        );

        let cells = state.cells();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[2].coord, GridCoord::new(1, 1));
        assert_eq!(state.rows(), 2);
        assert!(state.empty_positions().is_empty());
        let free: Vec<i64> = (0..=9).filter(|&p| state.is_free(p)).collect();
        assert_eq!(free, vec![3, 4, 5, 7, 8, 9]);
    }

    #[test]
    fn test_video_collisions_are_displaced() {
        // Fetch order puts record 5 first at position 2
        let state = GridState::build(
            MediaKind::Video,
            1,
            vec![video(1, 1), video(5, 2), video(4, 2), video(3, 4)],
            3,
        );

        assert_eq!(state.occupant(2).and_then(MediaRecord::id), Some(5));
        assert_eq!(state.collisions().len(), 1);
        assert_eq!(state.collisions()[0].id(), Some(4));

        let cells = state.cells();
        let displaced = cells.last().unwrap();
        assert_eq!(displaced.record_id(), Some(4));
        assert_eq!(displaced.position, 5);
        assert!(displaced.is_displaced());
        assert_eq!(state.cell_of(4), Some(GridCoord::new(1, 1)));

        // Position 5 is drawn on, so it is not offered as a hole
        assert!(!state.is_free(5));
        assert!(state.is_free(3));
        assert!(state.is_free(6));
    }

    #[test]
    fn test_ninth_video_reprojects_on_column_change() {
        let records = (1..=9).map(|p| video(p, p)).collect();
        let mut state = GridState::build(MediaKind::Video, 1, records, 4);
        assert_eq!(state.cell_of(9), Some(GridCoord::new(2, 0)));

        state.reproject(3);
        assert_eq!(state.cell_of(9), Some(GridCoord::new(2, 2)));
        assert_eq!(state.occupant(9).map(MediaRecord::position), Some(9));
    }

    #[test]
    fn test_apply_simple_move_video_only() {
        let mut state = GridState::build(MediaKind::Video, 1, vec![video(1, 1), video(2, 2)], 3);
        assert!(state.apply_simple_move(1, 5));
        assert!(!state.is_occupied(1));
        assert_eq!(state.occupant(5).map(MediaRecord::position), Some(5));
        assert_eq!(state.cell_of(1), Some(GridCoord::new(1, 1)));

        // Occupied target, unknown record
        assert!(!state.apply_simple_move(2, 5));
        assert!(!state.apply_simple_move(99, 7));

        let mut images = GridState::build(MediaKind::Image, 1, vec![image(1, 1)], 3);
        assert!(!images.apply_simple_move(1, 2));
    }

    #[test]
    fn test_empty_campus() {
        let state = GridState::build(MediaKind::Video, 1, vec![], 3);
        assert!(state.is_empty());
        assert_eq!(state.rows(), 0);
        assert!(state.cells().is_empty());
        assert!(state.empty_positions().is_empty());
        assert!(state.is_free(1));
    }

    #[test]
    fn test_far_video_position_stays_cheap() {
        let mut state = GridState::build(
            MediaKind::Video,
            1,
            vec![video(1, 1), video(2, 5_000_000)],
            4,
        );
        assert!(state.empty_positions().is_empty());
        assert_eq!(state.rows(), 1_250_000);
        assert!(state.is_free(4_999_999));
        assert_eq!(state.cell_of(2), Some(GridCoord::new(1_249_999, 3)));

        state.reproject(3);
        assert!(state.empty_positions().is_empty());
        assert_eq!(state.cells().len(), 2);
    }

    #[test]
    fn test_positions_near_i64_max_do_not_overflow() {
        let state = GridState::build(
            MediaKind::Video,
            1,
            vec![video(1, i64::MAX), video(2, i64::MAX), video(3, 2)],
            4,
        );
        assert_eq!(state.collisions().len(), 1);
        assert!(!state.is_free(i64::MAX));
        assert!(state.is_free(3));

        let cells = state.cells();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells.last().map(|c| c.position), Some(i64::MAX));
    }
}

//! Moves a record from one cell to another, swapping with the occupant when
//! the target is taken.

use tracing::{debug, info, warn};

use crate::error::CatalogResult;
use crate::models::{CatalogStore, MediaKind, PositionWrite, SWAP_SENTINEL_POSITION};

use super::allocator::PositionAllocator;
use super::state::GridState;

/// What a move did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Nothing stored at the source position; nothing written.
    NoSource,
    /// Source and target are the same cell.
    Unchanged,
    /// Target was free; one record changed position.
    Moved { record_id: i64, from: i64, to: i64 },
    /// Target was taken; the two records exchanged positions.
    Swapped {
        source_id: i64,
        target_id: i64,
        from: i64,
        to: i64,
    },
}

impl MoveOutcome {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Moved { .. } | Self::Swapped { .. })
    }
}

pub struct ReorderController<'a> {
    store: &'a mut CatalogStore,
}

impl<'a> ReorderController<'a> {
    pub fn new(store: &'a mut CatalogStore) -> Self {
        Self { store }
    }

    /// Moves whatever is stored at `from` to `to` and refreshes `state`.
    ///
    /// Occupancy is read from the store, not from `state`, so a stale grid
    /// cannot cause a wrong swap. All writes of a move share one transaction.
    /// On a store failure nothing is written, `state` is reloaded from the
    /// store and the error is returned.
    pub fn move_record(
        &mut self,
        state: &mut GridState,
        from: i64,
        to: i64,
    ) -> CatalogResult<MoveOutcome> {
        let kind = state.kind();
        let campus_id = state.campus_id();
        PositionAllocator::validate(kind, to)?;

        let Some(source_id) = self.store.occupant(kind, campus_id, from)? else {
            debug!(campus_id, from, to, "No record at source position, ignoring move");
            return Ok(MoveOutcome::NoSource);
        };
        if from == to {
            return Ok(MoveOutcome::Unchanged);
        }

        let (outcome, writes) = match self.store.occupant(kind, campus_id, to)? {
            Some(target_id) if target_id != source_id => (
                MoveOutcome::Swapped {
                    source_id,
                    target_id,
                    from,
                    to,
                },
                vec![
                    PositionWrite {
                        record_id: source_id,
                        position: SWAP_SENTINEL_POSITION,
                    },
                    PositionWrite {
                        record_id: target_id,
                        position: from,
                    },
                    PositionWrite {
                        record_id: source_id,
                        position: to,
                    },
                ],
            ),
            Some(_) => return Ok(MoveOutcome::Unchanged),
            None => (
                MoveOutcome::Moved {
                    record_id: source_id,
                    from,
                    to,
                },
                vec![PositionWrite {
                    record_id: source_id,
                    position: to,
                }],
            ),
        };

        if let Err(err) = self.store.write_positions(kind, campus_id, &writes) {
            warn!(campus_id, from, to, "Move failed, reloading grid from store: {}", err);
            self.reload(state);
            return Err(err);
        }

        info!(%kind, campus_id, from, to, ?outcome, "Committed move");
        self.refresh(state, outcome);
        Ok(outcome)
    }

    fn refresh(&self, state: &mut GridState, outcome: MoveOutcome) {
        if let MoveOutcome::Moved { record_id, to, .. } = outcome {
            if state.kind() == MediaKind::Video && state.apply_simple_move(record_id, to) {
                return;
            }
        }
        self.reload(state);
    }

    fn reload(&self, state: &mut GridState) {
        match GridState::load(&*self.store, state.kind(), state.campus_id(), state.columns()) {
            Ok(fresh) => *state = fresh,
            Err(err) => warn!(campus_id = state.campus_id(), "Grid reload failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use crate::models::{ImageRecord, MediaRecord, VideoRecord};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    /// Image campus with one record per position, named after it.
    fn image_campus(store: &CatalogStore, positions: &[i64]) -> (i64, BTreeMap<i64, i64>) {
        let campus = store.insert_campus("Pics", MediaKind::Image).unwrap();
        let ids = positions
            .iter()
            .map(|&position| {
                let image = ImageRecord::new(campus.id, format!("R{position}"), vec![1])
                    .with_position(position);
                (position, store.insert_image(&image).unwrap())
            })
            .collect();
        (campus.id, ids)
    }

    fn stored_positions(store: &CatalogStore, campus_id: i64) -> BTreeMap<i64, i64> {
        store
            .list_images(campus_id)
            .unwrap()
            .into_iter()
            .map(|image| (image.id.unwrap(), image.position))
            .collect()
    }

    fn load(store: &CatalogStore, kind: MediaKind, campus_id: i64) -> GridState {
        GridState::load(store, kind, campus_id, 5).unwrap()
    }

    #[test]
    fn test_swap_exchanges_positions() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let (campus, ids) = image_campus(&store, &[1, 3, 7]);
        let mut state = load(&store, MediaKind::Image, campus);

        let outcome = ReorderController::new(&mut store)
            .move_record(&mut state, 3, 7)
            .unwrap();

        assert_eq!(
            outcome,
            MoveOutcome::Swapped {
                source_id: ids[&3],
                target_id: ids[&7],
                from: 3,
                to: 7
            }
        );
        let positions = stored_positions(&store, campus);
        assert_eq!(positions[&ids[&3]], 7);
        assert_eq!(positions[&ids[&7]], 3);
        assert_eq!(positions[&ids[&1]], 1);

        // State was rebuilt from the store
        assert_eq!(state.occupant(7).and_then(MediaRecord::id), Some(ids[&3]));
        assert_eq!(state.occupant(3).and_then(MediaRecord::id), Some(ids[&7]));
    }

    #[test]
    fn test_simple_move_touches_one_record() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let (campus, ids) = image_campus(&store, &[1, 2, 3, 4]);
        let before = stored_positions(&store, campus);
        let mut state = load(&store, MediaKind::Image, campus);

        let outcome = ReorderController::new(&mut store)
            .move_record(&mut state, 3, 9)
            .unwrap();
        assert_eq!(
            outcome,
            MoveOutcome::Moved {
                record_id: ids[&3],
                from: 3,
                to: 9
            }
        );

        let after = stored_positions(&store, campus);
        for (id, position) in before {
            let expected = if id == ids[&3] { 9 } else { position };
            assert_eq!(after[&id], expected);
        }
        assert!(state.empty_positions().contains(&3));
        assert!(state.is_occupied(9));
    }

    #[test]
    fn test_swap_is_its_own_inverse() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let (campus, _) = image_campus(&store, &[1, 2, 5, 8]);
        let original = stored_positions(&store, campus);
        let mut state = load(&store, MediaKind::Image, campus);

        let mut controller = ReorderController::new(&mut store);
        controller.move_record(&mut state, 2, 5).unwrap();
        controller.move_record(&mut state, 5, 2).unwrap();

        assert_eq!(stored_positions(&store, campus), original);
    }

    #[test]
    fn test_positions_stay_unique_and_in_range() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let (campus, _) = image_campus(&store, &[1, 2, 3, 5, 8, 13, 15]);
        let mut state = load(&store, MediaKind::Image, campus);
        let count = state.len();

        // Walk a deterministic mix of swaps and simple moves
        let mut from = 1;
        for step in 0..60_i64 {
            let to = (from * 7 + step) % 15 + 1;
            ReorderController::new(&mut store)
                .move_record(&mut state, from, to)
                .unwrap();
            from = (to + step) % 15 + 1;

            let positions: Vec<i64> = stored_positions(&store, campus).into_values().collect();
            assert_eq!(positions.len(), count);
            assert!(positions.iter().all(|p| (1..=15).contains(p)));
            let mut unique = positions.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), count);
        }
    }

    #[test]
    fn test_missing_source_is_ignored() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let (campus, _) = image_campus(&store, &[1]);
        let before = stored_positions(&store, campus);
        let mut state = load(&store, MediaKind::Image, campus);

        let outcome = ReorderController::new(&mut store)
            .move_record(&mut state, 4, 1)
            .unwrap();
        assert_eq!(outcome, MoveOutcome::NoSource);
        assert!(!outcome.is_write());
        assert_eq!(stored_positions(&store, campus), before);
    }

    #[test]
    fn test_same_cell_is_unchanged() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let (campus, _) = image_campus(&store, &[4]);
        let mut state = load(&store, MediaKind::Image, campus);
        let outcome = ReorderController::new(&mut store)
            .move_record(&mut state, 4, 4)
            .unwrap();
        assert_eq!(outcome, MoveOutcome::Unchanged);
    }

    #[test]
    fn test_out_of_range_target_rejected() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let (campus, ids) = image_campus(&store, &[1]);
        let mut state = load(&store, MediaKind::Image, campus);

        let err = ReorderController::new(&mut store)
            .move_record(&mut state, 1, 16)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(stored_positions(&store, campus)[&ids[&1]], 1);
    }

    #[test]
    fn test_failed_swap_rolls_back_and_reloads() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let (campus, ids) = image_campus(&store, &[3, 7]);

        // Fail the second write of the swap
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER fail_move BEFORE UPDATE OF position ON image
                 WHEN NEW.position = 3
                 BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
            )
            .unwrap();

        // A stale in-memory grid, so the reload is observable
        let mut state = GridState::build(MediaKind::Image, campus, vec![], 3);
        assert!(state.is_empty());

        let err = ReorderController::new(&mut store)
            .move_record(&mut state, 3, 7)
            .unwrap_err();
        assert!(err.is_store_failure());

        // Nothing persisted, the sentinel included
        let positions = stored_positions(&store, campus);
        assert_eq!(positions[&ids[&3]], 3);
        assert_eq!(positions[&ids[&7]], 7);

        // Grid reconciled with the store
        assert_eq!(state.len(), 2);
        assert_eq!(state.occupant(3).and_then(MediaRecord::id), Some(ids[&3]));
    }

    #[test]
    fn test_video_simple_move_patches_in_place() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let campus = store.insert_campus("Clips", MediaKind::Video).unwrap();
        let ids: Vec<i64> = (1..=3)
            .map(|p| {
                let video = VideoRecord::new(campus.id, PathBuf::from(format!("/v/{p}.mp4")), None)
                    .with_position(p);
                store.insert_video(&video).unwrap()
            })
            .collect();
        let mut state = load(&store, MediaKind::Video, campus.id);

        let mut controller = ReorderController::new(&mut store);
        controller.move_record(&mut state, 1, 12).unwrap();
        assert_eq!(state.occupant(12).and_then(MediaRecord::id), Some(ids[0]));

        // Swaps still go through the store and back
        controller.move_record(&mut state, 2, 12).unwrap();
        assert_eq!(state.occupant(12).and_then(MediaRecord::id), Some(ids[1]));
        assert_eq!(state.occupant(2).and_then(MediaRecord::id), Some(ids[0]));
        assert_eq!(store.get_video(ids[0]).unwrap().unwrap().position, 2);
    }

    #[test]
    fn test_video_target_must_be_positive() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let campus = store.insert_campus("Clips", MediaKind::Video).unwrap();
        let mut state = load(&store, MediaKind::Video, campus.id);
        let err = ReorderController::new(&mut store)
            .move_record(&mut state, 1, 0)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }
}

use tracing::{debug, info};

use crate::error::{CatalogError, CatalogResult};
use crate::layout::{cell_to_position, position_to_cell, GridMetrics, Point, ResponsiveLayout};
use crate::models::{Campus, CatalogStore, CellState, GridCell, MediaKind};

use super::drag::{DragController, DragEffect, DragState, GridContext, HitCell};
use super::reorder::{MoveOutcome, ReorderController};
use super::state::GridState;

/// View model of one open campus grid.
///
/// Owns the column count, the current [`GridState`] and the drag state
/// machine. All methods run on the UI thread.
#[derive(Debug)]
pub struct GridSession {
    campus: Campus,
    layout: ResponsiveLayout,
    state: GridState,
    drag: DragController,
    /// Top-left corner of the grid container in pointer coordinates.
    origin: Point,
}

impl GridSession {
    /// Opens a campus grid sized for `window_width`.
    pub fn load(
        store: &CatalogStore,
        campus_id: i64,
        window_width: i32,
        context: GridContext,
    ) -> CatalogResult<Self> {
        let campus = store
            .get_campus(campus_id)?
            .ok_or_else(|| CatalogError::not_found("campus", campus_id))?;
        let metrics = GridMetrics::for_kind(campus.kind);
        Self::with_metrics(store, campus, metrics, window_width, context)
    }

    pub fn with_metrics(
        store: &CatalogStore,
        campus: Campus,
        metrics: GridMetrics,
        window_width: i32,
        context: GridContext,
    ) -> CatalogResult<Self> {
        let drag = DragController::new(campus.kind, context, metrics.drag_start_distance);
        let layout = ResponsiveLayout::new(metrics, window_width);
        let state = GridState::load(store, campus.kind, campus.id, layout.columns())?;

        info!(
            campus_id = campus.id,
            kind = %campus.kind,
            columns = layout.columns(),
            records = state.len(),
            "Opened grid"
        );

        Ok(Self {
            campus,
            layout,
            state,
            drag,
            origin: Point::default(),
        })
    }

    pub fn campus(&self) -> &Campus {
        &self.campus
    }

    pub fn kind(&self) -> MediaKind {
        self.campus.kind
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn columns(&self) -> usize {
        self.layout.columns()
    }

    pub fn metrics(&self) -> &GridMetrics {
        self.layout.metrics()
    }

    /// Last window width seen by [`load`](Self::load) or
    /// [`on_resize`](Self::on_resize).
    pub fn window_width(&self) -> i32 {
        self.layout.width()
    }

    /// Pixel size of the scrollable grid content.
    pub fn content_size(&self) -> (i32, i32) {
        self.metrics().content_size(self.columns(), self.state.rows())
    }

    pub fn drag_state(&self) -> DragState {
        self.drag.state()
    }

    pub fn set_origin(&mut self, origin: Point) {
        self.origin = origin;
    }

    pub fn set_context(&mut self, context: GridContext) -> DragEffect {
        self.drag.set_context(context)
    }

    /// Rebuilds the grid from the store.
    pub fn reload(&mut self, store: &CatalogStore) -> CatalogResult<()> {
        self.state = GridState::load(store, self.campus.kind, self.campus.id, self.columns())?;
        Ok(())
    }

    /// Returns `true` when the column count changed and the grid was redrawn.
    pub fn on_resize(&mut self, window_width: i32) -> bool {
        match self.layout.on_resize(window_width) {
            Some(columns) => {
                self.state.reproject(columns);
                true
            }
            None => false,
        }
    }

    /// Moves the record stored at `from` to `to`. On failure the grid has
    /// already been reloaded from the store when this returns.
    pub fn move_record(
        &mut self,
        store: &mut CatalogStore,
        from: i64,
        to: i64,
    ) -> CatalogResult<MoveOutcome> {
        ReorderController::new(store).move_record(&mut self.state, from, to)
    }

    /// Rows the pointer can land in. Video grids accept drops one row past
    /// the last drawn row, and never fewer than the configured guard.
    pub fn hit_test_rows(&self) -> usize {
        match self.kind() {
            MediaKind::Image => self.state.rows(),
            MediaKind::Video => (self.state.rows() + 1).max(self.metrics().hit_test_rows),
        }
    }

    /// The cell under `point`, if it is a position the grid can hold.
    pub fn hit_test(&self, point: Point) -> Option<HitCell> {
        let columns = self.columns();
        let coord = self
            .metrics()
            .point_to_cell(point, self.origin, columns, self.hit_test_rows())?;
        let position = cell_to_position(coord, columns);
        if let Some(capacity) = self.kind().capacity() {
            if position > capacity {
                return None;
            }
        }
        Some(HitCell {
            coord,
            position,
            occupied: self.state.is_occupied(position),
        })
    }

    pub fn pointer_down(&mut self, point: Point) -> DragEffect {
        let hit = self.hit_test(point);
        self.drag.pointer_down(point, hit)
    }

    pub fn pointer_move(&mut self, point: Point) -> DragEffect {
        let hit = self.hit_test(point);
        self.drag.pointer_move(point, hit)
    }

    /// Finishes a gesture, committing the move on a validated drop.
    pub fn pointer_up(
        &mut self,
        store: &mut CatalogStore,
        point: Point,
    ) -> CatalogResult<Option<MoveOutcome>> {
        let hit = self.hit_test(point);
        match self.drag.pointer_up(hit) {
            DragEffect::Drop { from, to } => self.move_record(store, from, to).map(Some),
            effect => {
                debug!(?effect, "Pointer released without a drop");
                Ok(None)
            }
        }
    }

    pub fn cancel_drag(&mut self) -> DragEffect {
        self.drag.cancel()
    }

    /// Cells to draw, with the hovered empty cell marked as a drop target.
    ///
    /// The hover is matched by position, so a resize mid-drag keeps the
    /// highlight on the same slot at its new coordinate.
    pub fn cells(&self) -> Vec<GridCell> {
        let mut cells = self.state.cells();
        if let DragState::HoverTarget { position, .. } = self.drag.state() {
            match cells.iter_mut().find(|cell| cell.position == position) {
                Some(cell) if cell.state == CellState::Empty => cell.state = CellState::DropTarget,
                Some(_) => {}
                None => {
                    if let Some(coord) = position_to_cell(position, self.columns()) {
                        cells.push(GridCell::new(coord, position, CellState::DropTarget));
                    }
                }
            }
        }
        cells
    }
}

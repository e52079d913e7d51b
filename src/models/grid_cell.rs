/// Zero-based cell coordinate in a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub row: usize,
    pub col: usize,
}

impl GridCoord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Holds a record. `stored_position` equals the cell's position unless the
    /// record collided with another one and was displaced for display.
    Occupied { record_id: i64, stored_position: i64 },
    /// Inside capacity, nothing stored here.
    Empty,
    /// Transient hover highlight while dragging. Never persisted.
    DropTarget,
}

/// One renderable cell of a campus grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub coord: GridCoord,
    pub position: i64,
    pub state: CellState,
}

impl GridCell {
    pub fn new(coord: GridCoord, position: i64, state: CellState) -> Self {
        Self {
            coord,
            position,
            state,
        }
    }

    pub fn record_id(&self) -> Option<i64> {
        match self.state {
            CellState::Occupied { record_id, .. } => Some(record_id),
            _ => None,
        }
    }

    pub fn is_displaced(&self) -> bool {
        matches!(
            self.state,
            CellState::Occupied { stored_position, .. } if stored_position != self.position
        )
    }
}

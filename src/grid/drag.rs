//! Pointer-driven drag-and-drop over a campus grid.
//!
//! The controller knows nothing about pixels beyond the start threshold;
//! callers hit-test the pointer and pass in the cell under it.

use tracing::{debug, trace};

use crate::layout::Point;
use crate::models::{GridCoord, MediaKind};

use super::allocator::PositionAllocator;

/// Flags shared by every card of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridContext {
    /// Cards can be dragged to new positions only while this is set.
    pub position_edit_mode: bool,
}

/// A grid cell under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitCell {
    pub coord: GridCoord,
    pub position: i64,
    /// Whether a record owns this position.
    pub occupied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    /// Dragging the record stored at `source`, not over a valid target.
    Dragging { source: i64 },
    /// Dragging over a cell that would accept the drop.
    HoverTarget {
        source: i64,
        candidate: GridCoord,
        position: i64,
    },
}

/// What the caller should do after feeding an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEffect {
    None,
    Started { source: i64 },
    Hover { candidate: GridCoord, position: i64 },
    HoverCleared,
    /// A validated drop: move the record at `from` to `to`.
    Drop { from: i64, to: i64 },
    Cancelled,
}

/// Press recorded before the pointer travelled far enough to start a drag.
#[derive(Debug, Clone, Copy)]
struct PendingPress {
    source: i64,
    at: Point,
}

#[derive(Debug)]
pub struct DragController {
    kind: MediaKind,
    context: GridContext,
    start_distance: i32,
    state: DragState,
    pending: Option<PendingPress>,
}

impl DragController {
    pub fn new(kind: MediaKind, context: GridContext, start_distance: i32) -> Self {
        Self {
            kind,
            context,
            start_distance,
            state: DragState::Idle,
            pending: None,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn context(&self) -> GridContext {
        self.context
    }

    /// Replaces the shared flags. Leaving edit mode aborts a drag in flight.
    pub fn set_context(&mut self, context: GridContext) -> DragEffect {
        self.context = context;
        if context.position_edit_mode {
            DragEffect::None
        } else {
            self.cancel()
        }
    }

    pub fn pointer_down(&mut self, at: Point, hit: Option<HitCell>) -> DragEffect {
        self.pending = None;
        if !self.context.position_edit_mode {
            return DragEffect::None;
        }
        if let Some(cell) = hit.filter(|cell| cell.occupied) {
            trace!(position = cell.position, "Press on occupied cell");
            self.pending = Some(PendingPress {
                source: cell.position,
                at,
            });
        }
        DragEffect::None
    }

    pub fn pointer_move(&mut self, at: Point, hit: Option<HitCell>) -> DragEffect {
        let source = match self.state {
            DragState::Idle => {
                let Some(press) = self.pending else {
                    return DragEffect::None;
                };
                if press.at.manhattan_distance(at) < self.start_distance {
                    return DragEffect::None;
                }
                self.pending = None;
                self.state = DragState::Dragging {
                    source: press.source,
                };
                debug!(source = press.source, "Drag started");
                return DragEffect::Started {
                    source: press.source,
                };
            }
            DragState::Dragging { source } | DragState::HoverTarget { source, .. } => source,
        };

        match self.accepts(source, hit) {
            Some(cell) => {
                if let DragState::HoverTarget { position, .. } = self.state {
                    if position == cell.position {
                        return DragEffect::None;
                    }
                }
                self.state = DragState::HoverTarget {
                    source,
                    candidate: cell.coord,
                    position: cell.position,
                };
                DragEffect::Hover {
                    candidate: cell.coord,
                    position: cell.position,
                }
            }
            None => {
                let was_hovering = matches!(self.state, DragState::HoverTarget { .. });
                self.state = DragState::Dragging { source };
                if was_hovering {
                    DragEffect::HoverCleared
                } else {
                    DragEffect::None
                }
            }
        }
    }

    /// Ends the gesture. Yields [`DragEffect::Drop`] only for a drop on a
    /// valid cell other than the source.
    pub fn pointer_up(&mut self, hit: Option<HitCell>) -> DragEffect {
        self.pending = None;
        let state = std::mem::take(&mut self.state);
        let source = match state {
            DragState::Idle => return DragEffect::None,
            DragState::Dragging { source } | DragState::HoverTarget { source, .. } => source,
        };

        match self.accepts(source, hit) {
            Some(cell) => {
                debug!(from = source, to = cell.position, "Drop accepted");
                DragEffect::Drop {
                    from: source,
                    to: cell.position,
                }
            }
            None => {
                debug!(source, "Drop outside a valid cell");
                DragEffect::Cancelled
            }
        }
    }

    pub fn cancel(&mut self) -> DragEffect {
        self.pending = None;
        match std::mem::take(&mut self.state) {
            DragState::Idle => DragEffect::None,
            _ => DragEffect::Cancelled,
        }
    }

    fn accepts(&self, source: i64, hit: Option<HitCell>) -> Option<HitCell> {
        hit.filter(|cell| {
            cell.position != source && PositionAllocator::validate(self.kind, cell.position).is_ok()
        })
    }
}

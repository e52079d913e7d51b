pub mod allocator;
pub mod drag;
pub mod reorder;
pub mod session;
pub mod state;

pub use allocator::PositionAllocator;
pub use drag::{DragController, DragEffect, DragState, GridContext, HitCell};
pub use reorder::{MoveOutcome, ReorderController};
pub use session::GridSession;
pub use state::GridState;

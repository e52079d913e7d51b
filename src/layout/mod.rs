pub mod grid_layout;
pub mod relayout;

pub use grid_layout::{
    cell_to_position, max_rows, point_to_cell, position_to_cell, CellRect, GridMetrics, Margins,
    Point,
};
pub use relayout::ResponsiveLayout;

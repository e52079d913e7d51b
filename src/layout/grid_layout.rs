use crate::models::{GridCoord, MediaKind};

/// Pixel position, relative to whatever origin the caller works in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(self, other: Point) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Inner padding between the grid container's edge and its first cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Margins {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Margins {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// Bounding box of one card, relative to the grid container origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CellRect {
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }
}

/// Geometry of a fixed-size card grid.
///
/// Cards have a fixed size; the number of columns is derived from the window
/// width and clamped to `[min_columns, max_columns]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridMetrics {
    /// Card width in pixels (default: 250)
    pub card_width: i32,
    /// Card height in pixels (default: 300)
    pub card_height: i32,
    /// Gap between neighbouring cards (default: 10)
    pub spacing: i32,
    /// Window width not available to the grid (scroll bar, page padding)
    pub window_margin: i32,
    pub content_margins: Margins,
    pub min_columns: usize,
    pub max_columns: usize,
    /// Row count used for pointer hit-testing on unbounded grids (default: 10)
    pub hit_test_rows: usize,
    /// Manhattan distance the pointer travels before a press becomes a drag
    pub drag_start_distance: i32,
}

impl Default for GridMetrics {
    fn default() -> Self {
        Self {
            card_width: 250,
            card_height: 300,
            spacing: 10,
            window_margin: 80,
            content_margins: Margins::new(10, 5, 10, 10),
            min_columns: 2,
            max_columns: 5,
            hit_test_rows: 10,
            drag_start_distance: 10,
        }
    }
}

impl GridMetrics {
    pub fn image() -> Self {
        Self::default()
    }

    pub fn video() -> Self {
        Self {
            window_margin: 60,
            content_margins: Margins::new(10, 10, 10, 10),
            ..Self::default()
        }
    }

    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => Self::image(),
            MediaKind::Video => Self::video(),
        }
    }

    /// Horizontal distance between the left edges of two neighbouring cards.
    fn pitch_x(&self) -> i32 {
        (self.card_width + self.spacing).max(1)
    }

    fn pitch_y(&self) -> i32 {
        (self.card_height + self.spacing).max(1)
    }

    /// Column count that fits `window_width`.
    pub fn columns_for_width(&self, window_width: i32) -> usize {
        let available = window_width - self.window_margin;
        let raw = available.div_euclid(self.pitch_x());
        let min = self.min_columns as i32;
        let max = self.max_columns.max(self.min_columns) as i32;
        raw.clamp(min, max) as usize
    }

    /// Maps a pointer location to the cell under it.
    ///
    /// `point` and `origin` share a coordinate space; `origin` is the grid
    /// container's top-left corner.
    pub fn point_to_cell(
        &self,
        point: Point,
        origin: Point,
        columns: usize,
        max_rows: usize,
    ) -> Option<GridCoord> {
        point_to_cell(
            point,
            origin,
            self.content_margins,
            (self.pitch_x(), self.pitch_y()),
            columns,
            max_rows,
        )
    }

    /// Bounding rectangle of a cell relative to the grid container origin.
    pub fn cell_rect(&self, coord: GridCoord) -> CellRect {
        CellRect {
            x: self.content_margins.left + coord.col as i32 * self.pitch_x(),
            y: self.content_margins.top + coord.row as i32 * self.pitch_y(),
            width: self.card_width,
            height: self.card_height,
        }
    }

    /// Total content size for a grid of `columns` x `rows` cards.
    pub fn content_size(&self, columns: usize, rows: usize) -> (i32, i32) {
        // Saturates: video grids can have rows far past what i32 pixels hold
        let span = |n: usize, card: i32| {
            if n == 0 {
                return 0;
            }
            let n = i32::try_from(n).unwrap_or(i32::MAX);
            n.saturating_mul(card)
                .saturating_add((n - 1).saturating_mul(self.spacing))
        };
        let m = self.content_margins;
        (
            m.left
                .saturating_add(span(columns, self.card_width))
                .saturating_add(m.right),
            m.top
                .saturating_add(span(rows, self.card_height))
                .saturating_add(m.bottom),
        )
    }
}

/// Rows needed to show `count` cells at `columns` per row.
pub fn max_rows(columns: usize, count: usize) -> usize {
    if columns == 0 {
        return 0;
    }
    count.div_ceil(columns)
}

/// Cell of a 1-based position. `None` for positions below 1.
pub fn position_to_cell(position: i64, columns: usize) -> Option<GridCoord> {
    if position < 1 || columns == 0 {
        return None;
    }
    let index = (position - 1) as usize;
    Some(GridCoord::new(index / columns, index % columns))
}

/// 1-based position of a cell.
pub fn cell_to_position(coord: GridCoord, columns: usize) -> i64 {
    (coord.row * columns + coord.col) as i64 + 1
}

/// Hit-tests a point against a grid with the given card pitch.
///
/// Returns `None` when the point falls left of/above the first cell or
/// outside `[0, max_rows) x [0, columns)`.
pub fn point_to_cell(
    point: Point,
    origin: Point,
    margins: Margins,
    pitch: (i32, i32),
    columns: usize,
    max_rows: usize,
) -> Option<GridCoord> {
    let x = point.x - origin.x - margins.left;
    let y = point.y - origin.y - margins.top;
    if x < 0 || y < 0 {
        return None;
    }

    let col = (x / pitch.0.max(1)) as usize;
    let row = (y / pitch.1.max(1)) as usize;
    if col >= columns || row >= max_rows {
        return None;
    }
    Some(GridCoord::new(row, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_for_width_clamps() {
        let metrics = GridMetrics::image();
        // (1000 - 80) / 260 = 3
        assert_eq!(metrics.columns_for_width(1000), 3);
        assert_eq!(metrics.columns_for_width(400), 2);
        assert_eq!(metrics.columns_for_width(0), 2);
        assert_eq!(metrics.columns_for_width(-50), 2);
        assert_eq!(metrics.columns_for_width(3000), 5);
        // Exactly four pitches after the margin
        assert_eq!(metrics.columns_for_width(80 + 4 * 260), 4);
        assert_eq!(metrics.columns_for_width(80 + 4 * 260 - 1), 3);
    }

    #[test]
    fn test_video_margin_differs() {
        let video = GridMetrics::video();
        // 60 + 3 * 260 fits three columns for video but not for image
        assert_eq!(video.columns_for_width(60 + 3 * 260), 3);
        assert_eq!(GridMetrics::image().columns_for_width(60 + 3 * 260), 2);
    }

    #[test]
    fn test_max_rows() {
        assert_eq!(max_rows(5, 15), 3);
        assert_eq!(max_rows(4, 15), 4);
        assert_eq!(max_rows(2, 15), 8);
        assert_eq!(max_rows(3, 0), 0);
        assert_eq!(max_rows(0, 7), 0);
    }

    #[test]
    fn test_position_cell_inverse() {
        for columns in 2..=5 {
            let rows = max_rows(columns, 15).max(10);
            for position in 1..=(columns * rows) as i64 {
                let cell = position_to_cell(position, columns).unwrap();
                assert!(cell.col < columns);
                assert_eq!(cell_to_position(cell, columns), position);
            }
        }
    }

    #[test]
    fn test_position_below_one_has_no_cell() {
        assert_eq!(position_to_cell(0, 4), None);
        assert_eq!(position_to_cell(-1, 4), None);
    }

    #[test]
    fn test_ninth_video_moves_with_columns() {
        assert_eq!(position_to_cell(9, 4), Some(GridCoord::new(2, 0)));
        assert_eq!(position_to_cell(9, 3), Some(GridCoord::new(2, 2)));
    }

    #[test]
    fn test_point_to_cell() {
        let metrics = GridMetrics::image();
        let origin = Point::new(100, 50);

        // First card starts after the content margins
        assert_eq!(
            metrics.point_to_cell(Point::new(110, 55), origin, 3, 5),
            Some(GridCoord::new(0, 0))
        );
        // Second column, second row
        assert_eq!(
            metrics.point_to_cell(Point::new(110 + 260 + 5, 55 + 310 + 5), origin, 3, 5),
            Some(GridCoord::new(1, 1))
        );
        // Inside the margins
        assert_eq!(metrics.point_to_cell(Point::new(105, 60), origin, 3, 5), None);
        // Past the last column
        assert_eq!(
            metrics.point_to_cell(Point::new(110 + 3 * 260, 60), origin, 3, 5),
            None
        );
        // Past the last row
        assert_eq!(
            metrics.point_to_cell(Point::new(120, 55 + 5 * 310), origin, 3, 5),
            None
        );
    }

    #[test]
    fn test_cell_rect_round_trips_through_hit_test() {
        let metrics = GridMetrics::video();
        for row in 0..3 {
            for col in 0..4 {
                let coord = GridCoord::new(row, col);
                let rect = metrics.cell_rect(coord);
                let center = Point::new(rect.x + rect.width / 2, rect.y + rect.height / 2);
                assert!(rect.contains(center));
                assert_eq!(
                    metrics.point_to_cell(center, Point::default(), 4, 3),
                    Some(coord)
                );
            }
        }
    }

    #[test]
    fn test_content_size() {
        let metrics = GridMetrics::image();
        assert_eq!(metrics.content_size(3, 5), (10 + 3 * 250 + 2 * 10 + 10, 5 + 5 * 300 + 4 * 10 + 10));
        assert_eq!(metrics.content_size(0, 0), (20, 15));
        assert_eq!(metrics.content_size(3, 1_250_000_000).1, i32::MAX);
    }
}

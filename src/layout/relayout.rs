use tracing::debug;

use super::grid_layout::GridMetrics;

/// Owns the current column count of one grid and recomputes it on resize.
///
/// Stored positions are never touched here; callers re-project them through
/// [`position_to_cell`](super::position_to_cell) when the count changes.
#[derive(Debug, Clone)]
pub struct ResponsiveLayout {
    metrics: GridMetrics,
    columns: usize,
    width: i32,
}

impl ResponsiveLayout {
    pub fn new(metrics: GridMetrics, window_width: i32) -> Self {
        let columns = metrics.columns_for_width(window_width);
        Self {
            metrics,
            columns,
            width: window_width,
        }
    }

    pub fn metrics(&self) -> &GridMetrics {
        &self.metrics
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Last width passed to [`new`](Self::new) or [`on_resize`](Self::on_resize).
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Records a new window width.
    ///
    /// Returns the new column count when it changed, `None` otherwise so
    /// pixel-by-pixel window drags do not trigger rebuilds.
    pub fn on_resize(&mut self, window_width: i32) -> Option<usize> {
        self.width = window_width;
        let columns = self.metrics.columns_for_width(window_width);
        if columns == self.columns {
            return None;
        }

        debug!(from = self.columns, to = columns, window_width, "Column count changed");
        self.columns = columns;
        Some(columns)
    }
}

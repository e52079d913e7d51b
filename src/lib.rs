//! Campus media catalog with a position-ordered, drag-and-drop grid.
//!
//! A campus holds either images (fixed 5x3 grid, positions 1..=15) or videos
//! (open-ended grid). [`grid`] owns placement, reordering and the drag state
//! machine; [`catalog`] wraps the store with the upload and edit flows.

pub mod catalog;
pub mod config;
pub mod error;
pub mod grid;
pub mod import;
pub mod layout;
pub mod media;
pub mod models;

pub use catalog::Library;
pub use config::AppPaths;
pub use error::{CatalogError, CatalogResult};

pub mod campus;
pub mod catalog_store;
pub mod grid_cell;
pub mod media_item;

pub use campus::*;
pub use catalog_store::*;
pub use grid_cell::*;
pub use media_item::*;

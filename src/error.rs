//! Error taxonomy for catalog and grid operations.

use thiserror::Error;

/// Errors surfaced by the catalog, the position allocator and the reorder path.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Input rejected before any write happened.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: id {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// Underlying SQLite failure (disk, constraint violation, ...).
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Thumbnail or media-info extraction failed. Callers degrade to
    /// placeholders instead of propagating this one.
    #[error("Media decode error: {0}")]
    MediaDecode(String),
}

impl CatalogError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// True for store and I/O failures, the class that forces a grid reload.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Io(_))
    }
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

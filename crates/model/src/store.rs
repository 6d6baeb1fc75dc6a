//! Persistence collaborator interface
//!
//! The engine never talks to a database directly. Everything goes through
//! [`PageStore`], whose calls are synchronous from the engine's point of view
//! but are only ever issued from worker threads, never from the interactive path.

use crate::codec::CodecError;
use crate::page::PageContent;
use crate::stroke::{Image, ImageId, PageId, Stroke, StrokeId};

/// Error types for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The page does not exist in the backing store
    #[error("page {0} not found")]
    PageNotFound(PageId),

    /// A single write exceeded the store's size ceiling
    #[error("payload of {size} bytes exceeds the store limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Stored data could not be decoded
    #[error("corrupt data for {what}: {reason}")]
    Corrupt { what: String, reason: String },

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure, usually transient
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the failure correlates with the size of the request
    pub fn is_payload_size(&self) -> bool {
        matches!(self, StoreError::PayloadTooLarge { .. })
    }
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::PayloadTooLarge { size, limit } => StoreError::PayloadTooLarge { size, limit },
            other => StoreError::Corrupt {
                what: "stroke points".to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Result type for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Backing store for page content
pub trait PageStore: Send + Sync {
    /// Fetch background, strokes, images, scroll and height of a page
    fn load_page_content(&self, page_id: PageId) -> StoreResult<PageContent>;

    /// Insert strokes (existing ids are replaced)
    fn create_strokes(&self, strokes: &[Stroke]) -> StoreResult<()>;

    /// Remove strokes by id; unknown ids are ignored
    fn delete_strokes(&self, ids: &[StrokeId]) -> StoreResult<()>;

    /// Insert images (existing ids are replaced)
    fn create_images(&self, images: &[Image]) -> StoreResult<()>;

    /// Remove images by id; unknown ids are ignored
    fn delete_images(&self, ids: &[ImageId]) -> StoreResult<()>;

    /// Persist the vertical scroll offset of a page
    fn update_page_scroll(&self, page_id: PageId, scroll_y: f32) -> StoreResult<()>;

    /// Persist an encoded preview of the last rendered bitmap
    fn save_preview(&self, _page_id: PageId, _png: &[u8]) -> StoreResult<()> {
        Ok(())
    }

    /// Load a previously saved preview
    fn load_preview(&self, _page_id: PageId) -> StoreResult<Option<Vec<u8>>> {
        Ok(None)
    }
}

//! Error types for history and editing

use inkpage_cache::{CacheError, ConfigError};
use inkpage_model::{CodecError, PageId};
use inkpage_render::RenderError;
use inkpage_storage::StorageError;

/// Errors from applying or reverting operation groups
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The group could not be applied; stacks are unchanged
    #[error("operation group rejected: {0}")]
    Rejected(#[from] CacheError),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors surfaced by the edit control surface
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("no active page")]
    NoActivePage,

    #[error("page {0} is still loading")]
    PageLoading(PageId),

    /// The stroke would not fit the store's payload ceiling
    #[error("stroke rejected: {0}")]
    Codec(#[from] CodecError),

    #[error("stroke needs at least one point")]
    EmptyStroke,

    #[error("nothing selected")]
    NothingSelected,

    #[error("clipboard is empty")]
    EmptyClipboard,

    #[error("scroll and zoom are disabled on this page")]
    TransformationNotAllowed,

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EditError {
    /// Whether the error is a stroke too large to ever persist
    pub fn is_oversize(&self) -> bool {
        matches!(self, EditError::Codec(CodecError::PayloadTooLarge { .. }))
    }
}

pub type EditResult<T> = Result<T, EditError>;

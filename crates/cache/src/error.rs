use inkpage_model::{BoundsViolation, ImageId, PageId, StoreError, StrokeId};

/// Cache consistency and persistence errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The page is not (or no longer) in the cache
    #[error("page {0} is not cached")]
    PageNotCached(PageId),

    #[error("stroke {stroke_id} not found on page {page_id}")]
    StrokeNotFound { page_id: PageId, stroke_id: StrokeId },

    #[error("image {image_id} not found on page {page_id}")]
    ImageNotFound { page_id: PageId, image_id: ImageId },

    #[error("stroke {0} is already on the page")]
    DuplicateStroke(StrokeId),

    #[error("image {0} is already on the page")]
    DuplicateImage(ImageId),

    /// Content addressed to one page was handed to another
    #[error("content for page {found} cannot be placed on page {expected}")]
    WrongPage { expected: PageId, found: PageId },

    #[error("zoom factor must be positive and finite, got {0}")]
    InvalidZoom(f32),

    #[error(transparent)]
    Bounds(#[from] BoundsViolation),

    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error("could not encode preview: {0}")]
    Preview(#[from] image::ImageError),
}

pub type CacheResult<T> = Result<T, CacheError>;

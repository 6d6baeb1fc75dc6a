//! Events published by the engine to the UI and other subscribers

use crate::geometry::IntRect;
use crate::stroke::{PageId, StrokeId};

/// Outcome of a page load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    Failed(String),
    Cancelled,
}

/// Engine → UI notifications
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A screen region must be presented again; `None` means the full surface
    RegionDirty(Option<IntRect>),

    /// Live stylus input was enabled or disabled
    DrawingStateChanged(bool),

    /// A page finished loading (or failed, or was cancelled)
    PageLoad { page_id: PageId, status: LoadStatus },

    /// Content could not be written even at the smallest batch size
    PersistFailed {
        page_id: PageId,
        stroke_ids: Vec<StrokeId>,
        reason: String,
    },

    /// Active page changed
    PageChanged(PageId),
}

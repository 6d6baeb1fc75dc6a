//! Inkpage data model
//!
//! Geometry, vector content (strokes and images), the binary stroke codec,
//! engine events and the persistence collaborator interface.

pub mod codec;
pub mod events;
pub mod geometry;
pub mod page;
pub mod store;
pub mod stroke;

pub use codec::{decode, encode, encode_with_limit, CodecError, CodecResult, DEFAULT_MAX_PAYLOAD};
pub use events::{EngineEvent, LoadStatus};
pub use geometry::{IntRect, Offset, Rect};
pub use page::{Background, PageContent};
pub use store::{PageStore, StoreError, StoreResult};
pub use stroke::{
    images_bounds, strokes_bounds, BoundsViolation, Color, Image, ImageId, PageId, Pen, PointMask,
    Stroke, StrokeId, StrokePoint,
};

//! Inkpage viewport rendering
//!
//! Software rasterization of vector page content onto a fixed-size surface,
//! with incremental repaint, scroll/zoom pixel reuse, a low-latency preview
//! layer for live input and erase geometry.

pub mod background;
pub mod compositor;
pub mod config;
pub mod erase;
pub mod error;
pub mod images;
pub mod preview;
pub mod raster;
pub mod transform;
pub mod viewport;
pub mod zoom;

pub use compositor::{composite, Exclusions, Scene};
pub use config::RenderConfig;
pub use erase::{erase_in_rect, erase_with_path, split_stroke, EraseResult};
pub use error::{RenderError, RenderResult};
pub use images::{FileImageSource, ImageSource, NoImages};
pub use preview::{PreviewLayer, PreviewPen};
pub use transform::ViewTransform;
pub use viewport::{ScrollOutcome, ViewportRenderer, ZoomOutcome};
pub use zoom::ZoomPolicy;

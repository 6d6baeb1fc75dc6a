//! Page-level descriptors shared between persistence and the cache

use crate::geometry::Offset;
use crate::stroke::{Image, Stroke};
use serde::{Deserialize, Serialize};

/// Background descriptor for a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Background {
    /// Plain white
    #[default]
    Blank,

    /// Procedural template ("blank", "lined", "dotted", "squared")
    Native { template: String },

    /// A raster image stretched to the page width
    Image { uri: String },
}

impl Background {
    pub fn native(template: impl Into<String>) -> Self {
        Background::Native {
            template: template.into(),
        }
    }

    /// Whether scroll and zoom are allowed on top of this background
    pub fn allows_transformation(&self) -> bool {
        !matches!(self, Background::Image { .. })
    }
}

/// Everything persistence returns for a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub background: Background,
    pub strokes: Vec<Stroke>,
    pub images: Vec<Image>,
    /// Top-left of the viewport in page coordinates
    pub scroll: Offset,
    /// Logical content height, `None` when never computed
    pub height: Option<f32>,
}

impl PageContent {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_json_is_tagged() {
        let json = serde_json::to_string(&Background::native("lined")).unwrap();
        assert_eq!(json, r#"{"kind":"native","template":"lined"}"#);

        let back: Background = serde_json::from_str(r#"{"kind":"blank"}"#).unwrap();
        assert_eq!(back, Background::Blank);
    }

    #[test]
    fn test_image_background_locks_transformation() {
        assert!(Background::Blank.allows_transformation());
        assert!(!Background::Image { uri: "a.png".into() }.allows_transformation());
    }
}

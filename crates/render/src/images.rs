//! Resolution of image URIs to decoded pixels

use image::RgbaImage;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Resolves an image URI (embedded image or image background) to pixels
pub trait ImageSource: Send + Sync {
    /// `None` when the image cannot be resolved; callers draw a placeholder
    fn get(&self, uri: &str) -> Option<Arc<RgbaImage>>;
}

/// Source that never resolves anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImages;

impl ImageSource for NoImages {
    fn get(&self, _uri: &str) -> Option<Arc<RgbaImage>> {
        None
    }
}

/// Loads images from disk, relative URIs resolved against `root`
///
/// Decoded images (and failures) are memoized for the lifetime of the source.
#[derive(Debug)]
pub struct FileImageSource {
    root: Option<PathBuf>,
    decoded: Mutex<HashMap<String, Option<Arc<RgbaImage>>>>,
}

impl FileImageSource {
    pub fn new() -> Self {
        Self {
            root: None,
            decoded: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            decoded: Mutex::new(HashMap::new()),
        }
    }

    fn resolve(&self, uri: &str) -> PathBuf {
        let path = PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }

    /// Insert an already decoded image under `uri`
    pub fn preload(&self, uri: impl Into<String>, image: RgbaImage) {
        self.decoded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uri.into(), Some(Arc::new(image)));
    }
}

impl Default for FileImageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSource for FileImageSource {
    fn get(&self, uri: &str) -> Option<Arc<RgbaImage>> {
        if let Some(hit) = self
            .decoded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(uri)
        {
            return hit.clone();
        }

        let path = self.resolve(uri);
        let decoded = match image::open(&path) {
            Ok(img) => Some(Arc::new(img.to_rgba8())),
            Err(e) => {
                tracing::warn!(uri, path = %path.display(), error = %e, "Failed to load image");
                None
            }
        };
        self.decoded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uri.to_string(), decoded.clone());
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_missing_file_is_none_and_memoized() {
        let source = FileImageSource::with_root("/nonexistent-inkpage-dir");
        assert!(source.get("missing.png").is_none());
        assert!(source
            .decoded
            .lock()
            .unwrap()
            .get("missing.png")
            .is_some_and(|v| v.is_none()));
    }

    #[test]
    fn test_preload() {
        let source = FileImageSource::new();
        source.preload("mem://a", RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 255])));
        let img = source.get("mem://a").unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3, 255]);
        assert!(NoImages.get("mem://a").is_none());
    }

    #[test]
    fn test_reads_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(3, 2, Rgba([9, 8, 7, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();

        let source = FileImageSource::with_root(dir.path());
        let img = source.get("a.png").unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1).0, [9, 8, 7, 255]);
    }
}

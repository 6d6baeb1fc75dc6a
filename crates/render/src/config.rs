//! Viewport renderer settings

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Continuous zoom scales the current bitmap; discrete zoom jumps between
    /// canonical ratios with a full repaint
    pub continuous_zoom: bool,
    /// Apply scroll deltas while the gesture is still moving
    pub smooth_scroll: bool,
    /// Always repaint fully instead of reusing shifted or scaled pixels
    pub simple_rendering: bool,
    /// Distance from a canonical ratio at which continuous zoom snaps to it
    pub snap_threshold: f32,
    /// Distance the unsnapped zoom must travel before a snap is released
    pub release_threshold: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Device width / height; the surface proportions when unset
    pub aspect_ratio: Option<f32>,
    /// Extra pixels repainted around exposed bands to hide seams
    pub overlap_px: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            continuous_zoom: false,
            smooth_scroll: true,
            simple_rendering: false,
            snap_threshold: 0.02,
            release_threshold: 0.05,
            min_zoom: 0.1,
            max_zoom: 10.0,
            aspect_ratio: None,
            overlap_px: 2,
        }
    }
}

impl RenderConfig {
    pub fn with_continuous_zoom(mut self, enabled: bool) -> Self {
        self.continuous_zoom = enabled;
        self
    }

    pub fn with_smooth_scroll(mut self, enabled: bool) -> Self {
        self.smooth_scroll = enabled;
        self
    }

    pub fn with_simple_rendering(mut self, enabled: bool) -> Self {
        self.simple_rendering = enabled;
        self
    }

    pub fn with_snap_thresholds(mut self, snap: f32, release: f32) -> Self {
        self.snap_threshold = snap;
        self.release_threshold = release.max(snap);
        self
    }

    pub fn with_zoom_bounds(mut self, min: f32, max: f32) -> Self {
        self.min_zoom = min;
        self.max_zoom = max;
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: f32) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    pub fn with_overlap(mut self, pixels: u32) -> Self {
        self.overlap_px = pixels;
        self
    }

    /// Overlap in pixels for a repaint at `zoom`
    pub fn overlap_at(&self, zoom: f32) -> i32 {
        (self.overlap_px as f32 * zoom.max(1.0)).ceil() as i32
    }

    /// Check the numeric settings; returns the name of the first bad field
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(self.min_zoom.is_finite() && self.min_zoom > 0.0) {
            return Err("min_zoom");
        }
        if !(self.max_zoom.is_finite() && self.max_zoom >= self.min_zoom) {
            return Err("max_zoom");
        }
        if !(self.snap_threshold.is_finite() && self.snap_threshold >= 0.0) {
            return Err("snap_threshold");
        }
        if !(self.release_threshold.is_finite() && self.release_threshold >= self.snap_threshold) {
            return Err("release_threshold");
        }
        if let Some(ratio) = self.aspect_ratio {
            if !(ratio.is_finite() && ratio > 0.0) {
                return Err("aspect_ratio");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.snap_threshold, 0.02);
        assert!(!config.continuous_zoom);
    }

    #[test]
    fn test_overlap_scales_with_zoom() {
        let config = RenderConfig::default();
        assert_eq!(config.overlap_at(0.5), 2);
        assert_eq!(config.overlap_at(1.0), 2);
        assert_eq!(config.overlap_at(2.5), 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert_eq!(RenderConfig::default().with_zoom_bounds(0.0, 2.0).validate(), Err("min_zoom"));
        assert_eq!(RenderConfig::default().with_zoom_bounds(2.0, 1.0).validate(), Err("max_zoom"));
        assert_eq!(RenderConfig::default().with_aspect_ratio(-1.0).validate(), Err("aspect_ratio"));
        let mut config = RenderConfig::default();
        config.release_threshold = 0.0;
        assert_eq!(config.validate(), Err("release_threshold"));
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let config: RenderConfig = serde_json::from_str(r#"{"continuous_zoom": true}"#).unwrap();
        assert!(config.continuous_zoom);
        assert_eq!(config.overlap_px, 2);
        assert_eq!(config.aspect_ratio, None);
    }
}

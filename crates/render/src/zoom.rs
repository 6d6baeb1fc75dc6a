//! Zoom policy: discrete ratio stepping and continuous zoom with snapping

use crate::config::RenderConfig;

/// Decides the next zoom level for a gesture
///
/// Keeps the unsnapped zoom separately so that a snapped level is released
/// only after the gesture has travelled `release_threshold` away from it.
#[derive(Debug, Clone)]
pub struct ZoomPolicy {
    raw: f32,
    snapped: Option<f32>,
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ZoomPolicy {
    pub fn new(zoom: f32) -> Self {
        Self {
            raw: zoom,
            snapped: None,
        }
    }

    /// Forget gesture history and continue from `zoom`
    pub fn reset(&mut self, zoom: f32) {
        self.raw = zoom;
        self.snapped = None;
    }

    pub fn snapped(&self) -> Option<f32> {
        self.snapped
    }

    /// Discrete step: zooming out lands on the smaller of 1 and the aspect
    /// ratio, zooming in on the larger. Factors inside the snap threshold
    /// are ignored.
    pub fn discrete(&mut self, current: f32, factor: f32, aspect: f32, config: &RenderConfig) -> f32 {
        if (factor - 1.0).abs() <= config.snap_threshold {
            return current;
        }
        let target = if factor < 1.0 { aspect.min(1.0) } else { aspect.max(1.0) };
        let target = target.clamp(config.min_zoom, config.max_zoom);
        self.reset(target);
        target
    }

    /// Continuous step: multiply, clamp, then snap to 1 or the aspect ratio
    pub fn continuous(&mut self, factor: f32, aspect: f32, config: &RenderConfig) -> f32 {
        self.raw = (self.raw * factor).clamp(config.min_zoom, config.max_zoom);

        if let Some(level) = self.snapped {
            if (self.raw - level).abs() <= config.release_threshold {
                return level;
            }
            self.snapped = None;
        }

        let nearest = [1.0, aspect]
            .into_iter()
            .min_by(|a, b| (self.raw - a).abs().total_cmp(&(self.raw - b).abs()))
            .unwrap_or(1.0);
        if (self.raw - nearest).abs() <= config.snap_threshold {
            self.snapped = Some(nearest);
            return nearest;
        }
        self.raw
    }
}

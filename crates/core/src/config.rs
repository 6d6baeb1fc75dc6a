//! Engine configuration
//!
//! Defaults, then an optional JSON file, then `INKPAGE_*` environment
//! overrides.

use inkpage_cache::{parse_env, CacheConfig, ConfigError, WriteCoordinatorConfig};
use inkpage_model::DEFAULT_MAX_PAYLOAD;
use inkpage_render::RenderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("inkpage"))
}

/// Everything the engine needs at construction time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Threads running loads, prefetches and input batches
    pub worker_count: usize,
    pub debug_logging: bool,
    /// Largest encoded stroke accepted, in bytes
    pub max_payload: usize,
    /// Stroke commits closer together than this share one undo step
    pub history_batch_ms: u64,
    pub history_limit: usize,
    pub eraser_radius: f32,
    /// Page-space offset applied to duplicated selections
    pub duplicate_offset: f32,
    /// How long input waits for the display to acknowledge a refresh
    pub refresh_timeout_ms: u64,
    pub render: RenderConfig,
    pub cache: CacheConfig,
    pub writer: WriteCoordinatorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            debug_logging: false,
            max_payload: DEFAULT_MAX_PAYLOAD,
            history_batch_ms: 500,
            history_limit: 100,
            eraser_radius: 10.0,
            duplicate_offset: 20.0,
            refresh_timeout_ms: 1000,
            render: RenderConfig::default(),
            cache: CacheConfig::default(),
            writer: WriteCoordinatorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// `<config dir>/inkpage/config.json`
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|p| p.join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load the file at the default path if present, then apply the
    /// environment
    pub fn discover() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Apply overrides from environment variables:
    /// - `INKPAGE_WORKERS`: worker thread count
    /// - `INKPAGE_DEBUG`: verbose logging
    /// - `INKPAGE_CONTINUOUS_ZOOM`, `INKPAGE_SMOOTH_SCROLL`,
    ///   `INKPAGE_SIMPLE_RENDERING`: renderer switches
    /// - `INKPAGE_ZOOM_SNAP`: continuous zoom snap threshold
    /// - `INKPAGE_MAX_PAYLOAD`: stroke payload ceiling in bytes
    /// - `INKPAGE_DEBOUNCE_MS`: persistence debounce window
    ///
    /// Cache variables are handled by [`CacheConfig::apply_env`].
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(workers) = parse_env("INKPAGE_WORKERS")? {
            self.worker_count = workers;
        }
        if let Some(debug) = parse_env("INKPAGE_DEBUG")? {
            self.debug_logging = debug;
        }
        if let Some(enabled) = parse_env("INKPAGE_CONTINUOUS_ZOOM")? {
            self.render.continuous_zoom = enabled;
        }
        if let Some(enabled) = parse_env("INKPAGE_SMOOTH_SCROLL")? {
            self.render.smooth_scroll = enabled;
        }
        if let Some(enabled) = parse_env("INKPAGE_SIMPLE_RENDERING")? {
            self.render.simple_rendering = enabled;
        }
        if let Some(snap) = parse_env::<f32>("INKPAGE_ZOOM_SNAP")? {
            self.render = self.render.clone().with_snap_thresholds(snap, self.render.release_threshold);
        }
        if let Some(limit) = parse_env("INKPAGE_MAX_PAYLOAD")? {
            self.max_payload = limit;
        }
        if let Some(ms) = parse_env("INKPAGE_DEBOUNCE_MS")? {
            self.writer.debounce_ms = ms;
        }
        self.cache.apply_env()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidValue("worker_count".to_string()));
        }
        if self.max_payload == 0 {
            return Err(ConfigError::InvalidValue("max_payload".to_string()));
        }
        if !(self.eraser_radius.is_finite() && self.eraser_radius > 0.0) {
            return Err(ConfigError::InvalidValue("eraser_radius".to_string()));
        }
        self.render
            .validate()
            .map_err(|field| ConfigError::InvalidValue(format!("render.{field}")))
    }
}

//! Cache configuration
//!
//! Values can be built programmatically, deserialized as part of the engine
//! configuration, or overridden from the environment.

use serde::{Deserialize, Serialize};
use std::io;
use std::str::FromStr;

/// Settings for the page cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Pages kept in memory before eviction kicks in
    pub max_pages: usize,
    /// Pages on each side of the active page that are prefetched and pinned
    pub neighbor_radius: usize,
    /// Space added below the lowest content when computing page height
    pub height_margin: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_pages: 20,
            neighbor_radius: 1,
            height_margin: 50.0,
        }
    }
}

impl CacheConfig {
    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn with_neighbor_radius(mut self, radius: usize) -> Self {
        self.neighbor_radius = radius;
        self
    }

    pub fn with_height_margin(mut self, margin: f32) -> Self {
        self.height_margin = margin;
        self
    }

    /// Defaults overridden from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from environment variables:
    /// - `INKPAGE_CACHE_PAGES`: maximum cached pages
    /// - `INKPAGE_NEIGHBOR_RADIUS`: neighbors pinned on each side
    /// - `INKPAGE_HEIGHT_MARGIN`: margin below content
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(pages) = parse_env("INKPAGE_CACHE_PAGES")? {
            self.max_pages = pages;
        }
        if let Some(radius) = parse_env("INKPAGE_NEIGHBOR_RADIUS")? {
            self.neighbor_radius = radius;
        }
        if let Some(margin) = parse_env::<f32>("INKPAGE_HEIGHT_MARGIN")? {
            if !margin.is_finite() || margin < 0.0 {
                return Err(ConfigError::InvalidValue("INKPAGE_HEIGHT_MARGIN".to_string()));
            }
            self.height_margin = margin;
        }
        Ok(())
    }
}

/// Read and parse an environment variable, `None` when it is unset
pub fn parse_env<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(var.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration key or variable
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("could not parse configuration: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "INKPAGE_CACHE_PAGES",
        "INKPAGE_NEIGHBOR_RADIUS",
        "INKPAGE_HEIGHT_MARGIN",
    ];

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_pages, 20);
        assert_eq!(config.neighbor_radius, 1);
        assert_eq!(config.height_margin, 50.0);
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_max_pages(3)
            .with_neighbor_radius(0)
            .with_height_margin(10.0);
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.neighbor_radius, 0);
        assert_eq!(config.height_margin, 10.0);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(VARS);
        env::set_var("INKPAGE_CACHE_PAGES", "5");
        env::set_var("INKPAGE_NEIGHBOR_RADIUS", "2");
        env::set_var("INKPAGE_HEIGHT_MARGIN", "12.5");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.neighbor_radius, 2);
        assert_eq!(config.height_margin, 12.5);
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(VARS);
        env::remove_var("INKPAGE_NEIGHBOR_RADIUS");
        env::remove_var("INKPAGE_HEIGHT_MARGIN");
        env::set_var("INKPAGE_CACHE_PAGES", "7");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.max_pages, 7);
        assert_eq!(config.neighbor_radius, 1); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(VARS);
        env::set_var("INKPAGE_CACHE_PAGES", "lots");
        assert!(matches!(
            CacheConfig::from_env(),
            Err(ConfigError::InvalidValue(var)) if var == "INKPAGE_CACHE_PAGES"
        ));

        env::set_var("INKPAGE_CACHE_PAGES", "4");
        env::set_var("INKPAGE_HEIGHT_MARGIN", "-1");
        assert!(CacheConfig::from_env().is_err());
    }

    #[test]
    fn test_json_missing_fields_use_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"max_pages": 4}"#).unwrap();
        assert_eq!(config.max_pages, 4);
        assert_eq!(config.height_margin, 50.0);
    }

    // Saves and restores environment variables around a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }
}

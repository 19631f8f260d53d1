//! Loader configuration
//!
//! Values can be read from a TOML or JSON file; anything left out falls back
//! to the defaults in `constants`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::codec::BinaryVersion;
use crate::constants::{loader, units};
use crate::error::{StreamError, StreamResult};

/// Configuration consumed by the streaming loader
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Octree metadata file
    pub metadata_file: PathBuf,
    /// Directory holding the per-octant particle files
    pub particles_dir: PathBuf,
    /// Resident star count that triggers eviction
    pub max_loaded_stars: i64,
    /// Octants at or above this depth are preloaded and never evicted
    pub preload_depth: u32,
    /// Maximum number of octants waiting in the load queue
    pub load_queue_capacity: usize,
    /// Octants loaded per drain pass
    pub batch_size: usize,
    /// Minimum interval between two effective queue clears
    pub min_queue_clear_ms: u64,
    /// Share of the budget eviction brings the resident count down to
    pub unload_hysteresis: f64,
    /// Idle re-check interval of the worker, 0 waits for explicit flushes only
    pub auto_flush_ms: u64,
    /// Particle file format version
    pub data_version: u32,
    /// Factor applied to positions on read
    pub position_factor: f64,
    /// Distance scale applied to positions, velocities and sizes on read
    pub distance_scale: f64,
    /// Epoch (Julian date) assigned to loaded particle groups
    pub epoch_jd: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            metadata_file: PathBuf::from("data/octree/metadata.bin"),
            particles_dir: PathBuf::from("data/octree/particles"),
            max_loaded_stars: loader::MAX_LOADED_STARS,
            preload_depth: loader::PRELOAD_DEPTH,
            load_queue_capacity: loader::LOAD_QUEUE_MAX_SIZE,
            batch_size: loader::MAX_LOAD_CHUNK,
            min_queue_clear_ms: loader::MIN_QUEUE_CLEAR_MS,
            unload_hysteresis: loader::UNLOAD_HYSTERESIS,
            auto_flush_ms: loader::AUTO_FLUSH_MS,
            data_version: 1,
            position_factor: 1.0,
            distance_scale: units::DISTANCE_SCALE_FACTOR,
            epoch_jd: units::JD_J2015_5,
        }
    }
}

impl LoaderConfig {
    /// Config for a dataset rooted at `dir` (`metadata.bin` + `particles/`)
    pub fn for_dataset(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            metadata_file: dir.join("metadata.bin"),
            particles_dir: dir.join("particles"),
            ..Default::default()
        }
    }

    /// Load a configuration file, picking the parser from the extension
    pub fn load(path: impl AsRef<Path>) -> StreamResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw)?,
            Some("toml") | None => Self::from_toml_str(&raw)?,
            Some(other) => {
                return Err(StreamError::Config(format!(
                    "unknown config format '{}' for {}",
                    other,
                    path.display()
                )))
            }
        };
        log::info!("Loaded loader config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> StreamResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(raw: &str) -> StreamResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> StreamResult<()> {
        if self.batch_size == 0 {
            return Err(StreamError::Config("batch_size must be at least 1".to_string()));
        }
        if self.load_queue_capacity == 0 {
            return Err(StreamError::Config(
                "load_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_loaded_stars <= 0 {
            return Err(StreamError::Config("max_loaded_stars must be positive".to_string()));
        }
        if !(self.unload_hysteresis > 0.0 && self.unload_hysteresis <= 1.0) {
            return Err(StreamError::Config(format!(
                "unload_hysteresis must be in (0, 1], got {}",
                self.unload_hysteresis
            )));
        }
        BinaryVersion::from_u32(self.data_version)?;
        Ok(())
    }

    pub fn min_queue_clear_interval(&self) -> Duration {
        Duration::from_millis(self.min_queue_clear_ms)
    }

    pub fn auto_flush_interval(&self) -> Option<Duration> {
        (self.auto_flush_ms > 0).then(|| Duration::from_millis(self.auto_flush_ms))
    }

    /// Resident star count eviction brings the working set down to
    pub fn unload_floor(&self) -> i64 {
        (self.max_loaded_stars as f64 * self.unload_hysteresis).floor() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LoaderConfig::default();
        config.validate().expect("Default config should validate");
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.load_queue_capacity, 100);
        assert_eq!(config.preload_depth, 3);
    }

    #[test]
    fn test_toml_overrides() {
        let config = LoaderConfig::from_toml_str(
            r#"
            max_loaded_stars = 1000
            preload_depth = 0
            batch_size = 2
            particles_dir = "/tmp/particles"
            "#,
        )
        .expect("Failed to parse TOML config");

        assert_eq!(config.max_loaded_stars, 1000);
        assert_eq!(config.preload_depth, 0);
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.particles_dir, PathBuf::from("/tmp/particles"));
        assert_eq!(config.load_queue_capacity, loader::LOAD_QUEUE_MAX_SIZE);
        assert_eq!(config.unload_floor(), 850);
    }

    #[test]
    fn test_json_config() {
        let config = LoaderConfig::from_json_str(r#"{ "auto_flush_ms": 0, "data_version": 0 }"#)
            .expect("Failed to parse JSON config");
        assert!(config.auto_flush_interval().is_none());
        assert_eq!(config.data_version, 0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(LoaderConfig::from_toml_str("batch_size = 0").is_err());
        assert!(LoaderConfig::from_toml_str("unload_hysteresis = 1.5").is_err());
        assert!(LoaderConfig::from_toml_str("data_version = 7").is_err());
    }
}

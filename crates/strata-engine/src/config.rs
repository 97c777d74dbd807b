//! Engine configuration.
//!
//! Collects the tunables of every subsystem into one serde struct that can
//! be loaded from and saved to a TOML file. Missing or invalid files fall
//! back to defaults with a warning rather than failing startup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use strata_worldgen::GenConfig;

use crate::occlusion::OcclusionConfig;
use crate::raster::RasterConfig;
use crate::relight::RelightConfig;

/// Configuration file name.
const CONFIG_FILE: &str = "strata.toml";

/// Engine configuration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === World Settings ===
    /// Render distance in columns
    pub render_distance: u32,
    /// World save directory
    pub save_dir: PathBuf,

    // === Meshing Settings ===
    /// Remesh requests dispatched per tick
    pub remeshes_per_tick: usize,

    // === Subsystem tables (keep after the scalar settings for TOML) ===
    /// Terrain generation parameters
    pub generation: GenConfig,
    /// Background lighting correction scheduling
    pub relight: RelightConfig,
    /// Analytic occlusion thresholds
    pub occlusion: OcclusionConfig,
    /// Software depth buffer dimensions
    pub raster: RasterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            render_distance: 8,
            save_dir: PathBuf::from("saves/world"),
            remeshes_per_tick: 8,
            generation: GenConfig::default(),
            relight: RelightConfig::default(),
            occlusion: OcclusionConfig::default(),
            raster: RasterConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default file location.
    /// Returns default config if the file doesn't exist.
    #[must_use]
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from a specific path.
    /// Returns default config if the file doesn't exist or is invalid.
    #[must_use]
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::File::open(path) {
            Ok(mut file) => {
                let mut contents = String::new();
                if let Err(e) = file.read_to_string(&mut contents) {
                    warn!("Failed to read config file: {e}");
                    return Self::default();
                }

                match toml::from_str(&contents) {
                    Ok(config) => {
                        info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        warn!("Failed to parse config file: {e}");
                        Self::default()
                    }
                }
            }
            Err(e) => {
                warn!("Failed to open config file: {e}");
                Self::default()
            }
        }
    }

    /// Save configuration to the default file location.
    pub fn save(&self) -> io::Result<()> {
        self.save_to(Self::config_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path.
    fn config_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.render_distance > 0);
        assert!(config.remeshes_per_tick > 0);
        assert!(config.occlusion.min_blocked_fraction <= 1.0);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = EngineConfig::load_from("/nonexistent/strata.toml");
        assert_eq!(config.render_distance, EngineConfig::default().render_distance);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");

        let mut config = EngineConfig::default();
        config.render_distance = 12;
        config.relight.near_radius = 9;
        config.occlusion.min_angular_size_deg = 30.0;
        config.save_to(&path).unwrap();

        let loaded = EngineConfig::load_from(&path);
        assert_eq!(loaded.render_distance, 12);
        assert_eq!(loaded.relight.near_radius, 9);
        assert!((loaded.occlusion.min_angular_size_deg - 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        fs::write(&path, "not [valid toml").unwrap();
        let config = EngineConfig::load_from(&path);
        assert_eq!(config.render_distance, EngineConfig::default().render_distance);
    }
}

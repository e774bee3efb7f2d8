//! Engine configuration
//!
//! Loaded from YAML; every field has a default so an empty file is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::detect::DetectorSettings;
use crate::pipeline::AxisModeDefaults;

/// Directory name under the platform config dir
const APP_DIR: &str = "joybind";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
    #[serde(default)]
    pub listening: ListeningConfig,
    /// Output axis index → deadzone mode, for mappings that leave it unset
    #[serde(default, skip_serializing_if = "is_default_axes")]
    pub axis_defaults: AxisModeDefaults,
    /// Mapping profile file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<PathBuf>,
    /// Action binding table (CSV)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindings: Option<PathBuf>,
    /// Virtual device ids whose game instance numbers are tracked
    #[serde(default = "default_virtual_slots")]
    pub virtual_slots: Vec<u32>,
}

/// Input detection tuning
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ListeningConfig {
    #[serde(default = "default_axis_threshold")]
    pub axis_threshold: f32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_stabilize_ticks")]
    pub stabilize_ticks: u32,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            axis_threshold: default_axis_threshold(),
            timeout_ms: default_timeout_ms(),
            stabilize_ticks: default_stabilize_ticks(),
        }
    }
}

impl ListeningConfig {
    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            axis_threshold: self.axis_threshold,
            timeout: Duration::from_millis(self.timeout_ms),
            stabilize_ticks: self.stabilize_ticks,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate(),
            listening: ListeningConfig::default(),
            axis_defaults: AxisModeDefaults::default(),
            profile: None,
            bindings: None,
            virtual_slots: default_virtual_slots(),
        }
    }
}

impl EngineConfig {
    /// Default config location: `<config dir>/joybind/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
    }

    /// Load configuration from file with validation.
    ///
    /// Relative `profile` and `bindings` paths are resolved against the
    /// config file's directory.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a map
        let config: EngineConfig = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.profile, &mut self.bindings].into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if !(1..=1000).contains(&self.tick_rate_hz) {
            anyhow::bail!("tick_rate_hz must be 1-1000, got {}", self.tick_rate_hz);
        }

        let threshold = self.listening.axis_threshold;
        if !(threshold > 0.0 && threshold < 2.0) {
            anyhow::bail!("listening.axis_threshold must be in (0, 2), got {}", threshold);
        }
        if self.listening.timeout_ms == 0 {
            anyhow::bail!("listening.timeout_ms must be greater than 0");
        }

        for (i, slot) in self.virtual_slots.iter().enumerate() {
            if *slot == 0 {
                anyhow::bail!("virtual_slots[{}]: virtual device ids start at 1", i);
            }
            if self.virtual_slots[..i].contains(slot) {
                anyhow::bail!("virtual_slots: device {} listed twice", slot);
            }
        }

        Ok(())
    }
}

fn default_tick_rate() -> u32 { 100 }
fn default_axis_threshold() -> f32 { 0.15 }
fn default_timeout_ms() -> u64 { 5000 }
fn default_stabilize_ticks() -> u32 { 3 }
fn default_virtual_slots() -> Vec<u32> { vec![1] }

fn is_default_axes(defaults: &AxisModeDefaults) -> bool {
    *defaults == AxisModeDefaults::default()
}

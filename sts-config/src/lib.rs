//! Shared configuration loader for the sts conversion tools.
//!
//! `defaults/sts.default.toml` is embedded into every binary so that docs and
//! runtime behavior stay in sync. Applications layer user-specific files on top
//! of those defaults via [`Loader`] before deserializing into [`StsConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sts_babel::{ConvertError, GeneratorSettings, LockSettings};

pub use config::ConfigError;

const DEFAULT_TOML: &str = include_str!("../defaults/sts.default.toml");

/// Top-level configuration consumed by the sts tools.
#[derive(Debug, Clone, Deserialize)]
pub struct StsConfig {
    pub store: StoreConfig,
    pub registry: RegistryConfig,
    pub generator: GeneratorConfig,
    pub render: RenderConfig,
    pub formula: FormulaConfig,
    pub logging: LoggingConfig,
}

/// Location and locking behavior of the cross-reference store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub lock_timeout_ms: u64,
    pub stale_after_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl From<&StoreConfig> for LockSettings {
    fn from(config: &StoreConfig) -> Self {
        LockSettings {
            timeout: Duration::from_millis(config.lock_timeout_ms),
            stale_after: Duration::from_millis(config.stale_after_ms),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub asset_base_url: String,
    pub image_extension: String,
    pub warning_marker: String,
}

impl TryFrom<&GeneratorConfig> for GeneratorSettings {
    type Error = ConvertError;

    fn try_from(config: &GeneratorConfig) -> Result<Self, Self::Error> {
        Ok(GeneratorSettings::new(&config.asset_base_url)?
            .with_image_extension(config.image_extension.clone())
            .with_warning_marker(config.warning_marker.clone()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    pub enabled: bool,
    /// Empty means auto-detect.
    pub chrome_binary: String,
    pub output_dir: PathBuf,
    pub public_dir: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl RenderConfig {
    pub fn chrome_binary(&self) -> Option<&Path> {
        if self.chrome_binary.trim().is_empty() {
            None
        } else {
            Some(Path::new(&self.chrome_binary))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormulaConfig {
    /// External converter command line; empty selects the built-in one.
    pub command: String,
}

impl FormulaConfig {
    pub fn command(&self) -> Option<&str> {
        let command = self.command.trim();
        (!command.is_empty()).then_some(command)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Apply a single key/value override (useful for CLI settings).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the resulting configuration.
    pub fn build(self) -> Result<StsConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<StsConfig, ConfigError> {
    Loader::new().build()
}

//! Application configuration, loaded from a TOML file via the `config` crate
//! and overridable by a handful of CLI flags.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownlinkMode {
    Lrit,
    Hrit,
}

impl DownlinkMode {
    /// Worker poll interval: LRIT downlinks trickle in slowly, HRIT is
    /// bursty and needs a much tighter poll to avoid backing up the intake
    /// queue.
    pub fn poll_interval(self) -> std::time::Duration {
        match self {
            DownlinkMode::Lrit => std::time::Duration::from_millis(54),
            DownlinkMode::Hrit => std::time::Duration::from_millis(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub address: Option<String>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Tcp,
    PrefixedTcp,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub spacecraft_id: u8,
    pub mode: DownlinkMode,
    pub output_root: PathBuf,
    pub keys_path: Option<PathBuf>,
    pub dump_path: Option<PathBuf>,
    pub source: SourceConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl AppConfig {
    /// Loads configuration from `path` (TOML), falling back to the
    /// `XRIT_` environment prefix for overrides (e.g. `XRIT_OUTPUT_ROOT`).
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("XRIT").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

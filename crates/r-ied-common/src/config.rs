//! ---
//! ied_section: "01-core-functionality"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Shared primitives and utilities for the relay runtime."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use strum::{Display, EnumString};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8001))
}

fn default_simulation_enabled() -> bool {
    true
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_simulation_seed() -> u64 {
    0x6185_0u64
}

fn default_capture_capacity() -> usize {
    1024
}

/// Primary configuration object for the relay runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no candidate existed and built-in defaults are in use.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "R_IED_CONFIG";

    /// Load configuration from disk, respecting the `R_IED_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// An explicit `R_IED_CONFIG` path must exist. When none of the candidates exist the
    /// defaults are returned, so a bare daemon starts against the built-in relay model.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found, using defaults"
        );
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.simulation.validate()?;
        if let Some(ied) = &self.api.scope_ied {
            if ied.trim().is_empty() {
                return Err(anyhow!("api.scope_ied must not be empty when set"));
            }
        }
        if self.capture.channel_capacity == 0 {
            return Err(anyhow!("capture.channel_capacity must be greater than zero"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// How path segments are compared against declared child names.
#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NameMatching {
    #[default]
    Exact,
    CaseInsensitive,
}

/// Decides when a cell reports its value as old data.
#[serde_as]
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum StalenessPolicy {
    /// Only cells never written since start-up carry the old-data flag.
    #[default]
    InitialOnly,
    /// Cells not written within `max_age` report old data when read.
    MaxAge {
        #[serde_as(as = "DurationMilliSeconds<u64>")]
        #[serde(rename = "max_age_ms")]
        max_age: Duration,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Optional TOML model declaration. The built-in relay model is used when unset.
    #[serde(default)]
    pub declaration: Option<PathBuf>,
    #[serde(default)]
    pub name_matching: NameMatching,
    #[serde(default)]
    pub staleness: StalenessPolicy,
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if let StalenessPolicy::MaxAge { max_age } = self.staleness {
            if max_age.is_zero() {
                return Err(anyhow!("model.staleness max_age_ms must be greater than zero"));
            }
        }
        if let Some(path) = &self.declaration {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("model.declaration must not be empty when set"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
    /// When set, request paths are relative to this IED (`/C1/LN0.NamPlt.vendor`).
    #[serde(default)]
    pub scope_ied: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
            scope_ied: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_simulation_enabled")]
    pub enabled: bool,
    #[serde(default = "default_tick_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "tick_interval_ms")]
    pub tick_interval: Duration,
    #[serde(default = "default_simulation_seed")]
    pub random_seed: u64,
    /// Standard deviation of Gaussian noise added to voltage magnitudes. Zero disables noise.
    #[serde(default)]
    pub noise_sigma: f64,
    /// Stop after this long; runs until shutdown when unset.
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub run_for: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: default_simulation_enabled(),
            tick_interval: default_tick_interval(),
            random_seed: default_simulation_seed(),
            noise_sigma: 0.0,
            run_for: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("simulation.tick_interval_ms must be greater than zero"));
        }
        if !self.noise_sigma.is_finite() || self.noise_sigma < 0.0 {
            return Err(anyhow!(
                "simulation.noise_sigma must be a finite, non-negative number"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Frames buffered between the capture hand-off and the decoder task.
    #[serde(default = "default_capture_capacity")]
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_capture_capacity(),
        }
    }
}

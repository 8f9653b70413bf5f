//! ---
//! cds_section: "01-core-services"
//! cds_subsection: "module"
//! cds_type: "source"
//! cds_scope: "code"
//! cds_description: "Shared primitives and utilities for the driver services."
//! cds_version: "v0.0.0-prealpha"
//! cds_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_fw_ready_timeout() -> Duration {
    Duration::from_millis(15_000)
}

fn default_probe_timeout() -> Duration {
    Duration::from_millis(2_000)
}

fn default_radio_stop_timeout() -> Duration {
    Duration::from_millis(15_000)
}

fn default_crash_inject_timeout() -> Duration {
    Duration::from_millis(5_000)
}

fn default_max_stations() -> u32 {
    32
}

fn default_radio_index() -> i32 {
    -1
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9899))
}

/// Top-level configuration consumed by the daemon and the core services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where a [`ServicesConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedServicesConfig {
    pub config: ServicesConfig,
    pub source: PathBuf,
}

impl ServicesConfig {
    pub const ENV_CONFIG_PATH: &'static str = "CDS_CONFIG";

    /// Load configuration from disk, respecting the `CDS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedServicesConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedServicesConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedServicesConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<Self>()
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.timeouts.validate()?;
        if self.diagnostics.radio_index < -1 {
            return Err(anyhow!(
                "diagnostics.radio_index must be -1 (unset) or a non-negative index, got {}",
                self.diagnostics.radio_index
            ));
        }
        if self.driver.mode == DriverMode::Mission && self.driver.max_stations == 0 {
            return Err(anyhow!("driver.max_stations must be non-zero in mission mode"));
        }
        Ok(())
    }
}

impl std::str::FromStr for ServicesConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: ServicesConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Global operating mode of the driver.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverMode {
    #[default]
    Mission,
    Ftm,
    Epping,
    Monitor,
}

impl DriverMode {
    /// Factory-test and endpoint-ping modes run without the packet log service.
    pub fn supports_packet_log(&self) -> bool {
        !matches!(self, DriverMode::Ftm | DriverMode::Epping)
    }
}

impl std::str::FromStr for DriverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mission" => Ok(DriverMode::Mission),
            "ftm" => Ok(DriverMode::Ftm),
            "epping" => Ok(DriverMode::Epping),
            "monitor" => Ok(DriverMode::Monitor),
            other => Err(format!("unknown driver mode: {}", other)),
        }
    }
}

/// Narrow channel operation configured for the radio.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelWidth {
    #[default]
    Standard,
    Five,
    Ten,
}

/// Chip family reported by the platform; selects the data-plane attach variant.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChipFamily {
    #[default]
    Legacy,
    Lithium,
}

/// Per-start driver ("ini") configuration installed into the global context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub mode: DriverMode,
    #[serde(default)]
    pub self_recovery_enabled: bool,
    #[serde(default)]
    pub sub_20_channel_width: ChannelWidth,
    #[serde(default)]
    pub packet_log_enabled: bool,
    #[serde(default = "default_max_stations")]
    pub max_stations: u32,
    #[serde(default)]
    pub chip_family: ChipFamily,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            mode: DriverMode::default(),
            self_recovery_enabled: false,
            sub_20_channel_width: ChannelWidth::default(),
            packet_log_enabled: false,
            max_stations: default_max_stations(),
            chip_family: ChipFamily::default(),
        }
    }
}

/// Bounded waits applied by the lifecycle orchestrator and recovery trigger.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_fw_ready_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub firmware_ready_ms: Duration,
    #[serde(default = "default_probe_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub probe_ms: Duration,
    #[serde(default = "default_radio_stop_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub radio_stop_ms: Duration,
    #[serde(default = "default_crash_inject_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub crash_inject_ms: Duration,
}

impl TimeoutConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("firmware_ready_ms", self.firmware_ready_ms),
            ("probe_ms", self.probe_ms),
            ("radio_stop_ms", self.radio_stop_ms),
            ("crash_inject_ms", self.crash_inject_ms),
        ] {
            if value.is_zero() {
                return Err(anyhow!("timeouts.{} must be greater than zero", name));
            }
        }
        Ok(())
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            firmware_ready_ms: default_fw_ready_timeout(),
            probe_ms: default_probe_timeout(),
            radio_stop_ms: default_radio_stop_timeout(),
            crash_inject_ms: default_crash_inject_timeout(),
        }
    }
}

/// Diagnostic knobs seeded into the global context at bring-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default)]
    pub fatal_event_enabled: bool,
    #[serde(default)]
    pub wakelock_logging: bool,
    #[serde(default)]
    pub multicast_logging: bool,
    #[serde(default = "default_radio_index")]
    pub radio_index: i32,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            fatal_event_enabled: false,
            wakelock_logging: false,
            multicast_logging: false,
            radio_index: default_radio_index(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ServicesConfig = "".parse().unwrap();
        assert_eq!(config.driver.mode, DriverMode::Mission);
        assert_eq!(config.timeouts.firmware_ready_ms, Duration::from_secs(15));
        assert_eq!(config.diagnostics.radio_index, -1);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = "[timeouts]\nprobe_ms = 0\n"
            .parse::<ServicesConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("probe_ms"));
    }

    #[test]
    fn packet_log_skipped_in_test_modes() {
        assert!(DriverMode::Mission.supports_packet_log());
        assert!(DriverMode::Monitor.supports_packet_log());
        assert!(!DriverMode::Ftm.supports_packet_log());
        assert!(!DriverMode::Epping.supports_packet_log());
    }
}

use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::DEFAULT_TIMEOUT;
use shared::types::{ExperimentType, ServiceInfo};
use crate::parser::normalize_duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub synth: SynthConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Services registered at startup
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Values applied when an instruction leaves a parameter out
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    #[serde(default = "default_duration")]
    pub default_duration: String,
    #[serde(default = "default_load_percent")]
    pub default_cpu_percent: u64,
    #[serde(default = "default_load_percent")]
    pub default_mem_percent: u64,
    #[serde(default = "default_loss_percent")]
    pub default_loss_percent: u64,
    #[serde(default = "default_interface")]
    pub default_interface: String,
    #[serde(default = "default_disk_path")]
    pub default_disk_path: String,
    /// Megabytes
    #[serde(default = "default_disk_size")]
    pub default_disk_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthConfig {
    /// Experiment types the catalog will synthesize commands for
    #[serde(default = "default_enabled_types")]
    pub enabled_types: Vec<ExperimentType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// TOML file with `[[services]]` entries, re-read on an interval
    #[serde(default)]
    pub services_file: Option<PathBuf>,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_duration() -> String {
    DEFAULT_TIMEOUT.to_string()
}

fn default_load_percent() -> u64 {
    80
}

fn default_loss_percent() -> u64 {
    50
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_disk_path() -> String {
    "/tmp".to_string()
}

fn default_disk_size() -> u64 {
    1024
}

fn default_enabled_types() -> Vec<ExperimentType> {
    ExperimentType::ALL.to_vec()
}

fn default_refresh_interval() -> u64 {
    60
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_duration: default_duration(),
            default_cpu_percent: default_load_percent(),
            default_mem_percent: default_load_percent(),
            default_loss_percent: default_loss_percent(),
            default_interface: default_interface(),
            default_disk_path: default_disk_path(),
            default_disk_size: default_disk_size(),
        }
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            enabled_types: default_enabled_types(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            services_file: None,
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let p = &self.parser;
        for (name, value) in [
            ("default_cpu_percent", p.default_cpu_percent),
            ("default_mem_percent", p.default_mem_percent),
            ("default_loss_percent", p.default_loss_percent),
        ] {
            if !(1..=100).contains(&value) {
                bail!("parser.{} must be within 1..=100, got {}", name, value);
            }
        }
        if p.default_disk_size == 0 {
            bail!("parser.default_disk_size must be positive");
        }
        normalize_duration(&p.default_duration)
            .with_context(|| format!("parser.default_duration '{}' is malformed", p.default_duration))?;
        if self.discovery.refresh_interval_secs == 0 {
            bail!("discovery.refresh_interval_secs must be positive");
        }
        Ok(())
    }
}

/// Services listed in a discovery file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicesFile {
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
}

impl ServicesFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read services file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse services file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.api.listen, "0.0.0.0:8080");
        assert_eq!(config.parser.default_duration, "30s");
        assert_eq!(config.parser.default_cpu_percent, 80);
        assert_eq!(config.synth.enabled_types.len(), 5);
        assert!(config.discovery.services_file.is_none());
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [api]
            listen = "127.0.0.1:9000"

            [parser]
            default_duration = "1m"
            default_interface = "ens3"

            [synth]
            enabled_types = ["cpu", "process"]

            [[services]]
            name = "web-server"
            host = "localhost"
            port = 8080
            process = "nginx"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.listen, "127.0.0.1:9000");
        assert_eq!(config.parser.default_duration, "1m");
        assert_eq!(config.parser.default_interface, "ens3");
        assert_eq!(config.parser.default_loss_percent, 50);
        assert_eq!(
            config.synth.enabled_types,
            vec![ExperimentType::Cpu, ExperimentType::Process]
        );
        assert_eq!(config.services[0].process, "nginx");
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = Config::from_toml(include_str!("../../config/chaos-mcpd.toml")).unwrap();
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[1].process, "postgres");
    }

    #[test]
    fn test_rejects_out_of_range_default() {
        let err = Config::from_toml("[parser]\ndefault_cpu_percent = 150\n").unwrap_err();
        assert!(err.to_string().contains("default_cpu_percent"));
    }

    #[test]
    fn test_rejects_malformed_default_duration() {
        assert!(Config::from_toml("[parser]\ndefault_duration = \"soon\"\n").is_err());
    }
}

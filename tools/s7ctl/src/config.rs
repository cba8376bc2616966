//! s7ctl configuration
//!
//! Loaded from `--config <FILE>` when given, otherwise layered from
//! `config/default.*`, `config/s7ctl.*` and `S7CTL_*` environment variables.

use anyhow::{Context, Result};
use s7_comlink::{ClientOptions, DataBlockConfig, SimulatorConfig};
use s7_common::config::{load_config, load_config_from_file};
use s7_common::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_NAME: &str = "s7ctl";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S7ctlConfig {
    pub plc: PlcConfig,
    pub client: ClientOptions,
    pub simulator: SimulatorConfig,
    pub poll: PollConfig,
    pub log: LogConfig,
}

/// Connection target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlcConfig {
    pub address: String,
    pub rack: u16,
    pub slot: u16,
}

impl Default for PlcConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            rack: 0,
            slot: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    /// Number of reads, 0 polls until interrupted
    pub count: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            count: 0,
        }
    }
}

impl S7ctlConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: Self = match path {
            Some(path) => load_config_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => load_config(CONFIG_NAME).context("Failed to load s7ctl configuration")?,
        };
        if config.simulator.data_blocks.is_empty() {
            config.simulator.data_blocks = default_data_blocks();
        }
        Ok(config)
    }

    /// Configuration written by `s7ctl init-config`
    pub fn template() -> Self {
        let mut config = Self::default();
        config.simulator.data_blocks = default_data_blocks();
        config
    }
}

fn default_data_blocks() -> Vec<DataBlockConfig> {
    vec![DataBlockConfig {
        number: 1,
        size: 1024,
    }]
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use s7_common::LogFormat;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("s7ctl.yaml");
        std::fs::write(
            &path,
            r#"
plc:
  address: 192.168.0.10
  slot: 2
client:
  guard_disconnected: false
simulator:
  data_blocks:
    - number: 1000
      size: 512
poll:
  interval_ms: 200
log:
  level: debug
  format: json
"#,
        )
        .unwrap();

        let config = S7ctlConfig::load(Some(&path)).unwrap();
        assert_eq!(config.plc.address, "192.168.0.10");
        assert_eq!(config.plc.rack, 0);
        assert_eq!(config.plc.slot, 2);
        assert!(!config.client.guard_disconnected);
        assert!(config.client.disconnect_on_drop);
        assert_eq!(config.simulator.data_blocks.len(), 1);
        assert_eq!(config.simulator.data_blocks[0].number, 1000);
        assert_eq!(config.simulator.image_size, 1024);
        assert_eq!(config.poll.interval_ms, 200);
        assert_eq!(config.poll.count, 0);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_missing_data_blocks_get_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("s7ctl.toml");
        std::fs::write(&path, "[plc]\nrack = 1\n").unwrap();

        let config = S7ctlConfig::load(Some(&path)).unwrap();
        assert_eq!(config.plc.rack, 1);
        assert_eq!(config.simulator.data_blocks[0].number, 1);
    }

    #[test]
    fn test_template_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("s7ctl.yaml");
        s7_common::config::save_config_to_file(&S7ctlConfig::template(), &path).unwrap();

        let config = S7ctlConfig::load(Some(&path)).unwrap();
        assert_eq!(config.plc.address, "127.0.0.1");
        assert_eq!(config.simulator.data_blocks[0].size, 1024);
    }
}

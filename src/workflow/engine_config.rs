//! Engine configuration
//!
//! Loaded from engine.yaml. Declares the adapters to bring live at startup,
//! the pool tuner and initial pool sizes, and where flow definitions live:
//!
//! ```yaml
//! flows_dir: flows
//! default_timeout_ms: 30000
//!
//! adapters:
//!   - id: orders-api
//!     name: Orders API
//!     type: HTTP
//!     mode: INBOUND
//!     properties:
//!       url: https://orders.example.com/api/orders
//!
//! tuner:
//!   interval_ms: 15000
//!
//! pools:
//!   http:
//!     max_size: 50
//!     min_idle: 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::loader::LoadError;
use crate::adapter::AdapterConfiguration;
use crate::pool::{PoolsConfig, TunerConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub adapters: Vec<AdapterConfiguration>,

    #[serde(default)]
    pub tuner: TunerConfig,

    #[serde(default)]
    pub pools: PoolsConfig,

    /// Directory of flow definitions, relative to the config file
    #[serde(default)]
    pub flows_dir: Option<PathBuf>,

    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            adapters: Vec::new(),
            tuner: TunerConfig::default(),
            pools: PoolsConfig::default(),
            flows_dir: None,
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: EngineConfig =
            serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
                file: path.display().to_string(),
                error: e,
            })?;

        if let (Some(dir), Some(base)) = (&config.flows_dir, path.parent()) {
            if dir.is_relative() {
                config.flows_dir = Some(base.join(dir));
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.default_timeout_ms == 0 {
            return Err(LoadError::InvalidDefinition(
                "default_timeout_ms must be positive".to_string(),
            ));
        }
        self.tuner
            .validate()
            .map_err(|e| LoadError::InvalidDefinition(e.to_string()))?;

        let mut ids: Vec<&str> = self.adapters.iter().filter_map(|a| a.id.as_deref()).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(LoadError::InvalidDefinition(format!(
                "adapter id '{}' is declared more than once",
                pair[0]
            )));
        }
        Ok(())
    }
}

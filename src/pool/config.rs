//! Pool tuner configuration
//!
//! Loaded from the `tuner:` and `pools:` sections of engine.yaml:
//!
//! ```yaml
//! tuner:
//!   interval_ms: 30000
//!   critical_utilization: 0.95
//!   database:
//!     min_size: 5
//!     max_size: 50
//!     min_idle: 2
//!
//! pools:
//!   database:
//!     max_size: 20
//!     min_idle: 2
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::managed::PoolKind;
use super::PoolError;

/// Hard limits the tuner never crosses for one pool kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBounds {
    pub min_size: u32,
    pub max_size: u32,
    pub min_idle: u32,
}

impl PoolBounds {
    pub fn database() -> Self {
        Self {
            min_size: 5,
            max_size: 50,
            min_idle: 2,
        }
    }

    pub fn http() -> Self {
        Self {
            min_size: 10,
            max_size: 200,
            min_idle: 5,
        }
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.min_size == 0 || self.min_size > self.max_size {
            return Err(PoolError::InvalidBounds(format!(
                "min_size {} must be between 1 and max_size {}",
                self.min_size, self.max_size
            )));
        }
        if self.min_idle > self.min_size {
            return Err(PoolError::InvalidBounds(format!(
                "min_idle {} exceeds min_size {}",
                self.min_idle, self.min_size
            )));
        }
        Ok(())
    }

    pub fn clamp(&self, size: u32) -> u32 {
        size.clamp(self.min_size, self.max_size)
    }
}

fn default_database_bounds() -> PoolBounds {
    PoolBounds::database()
}

fn default_http_bounds() -> PoolBounds {
    PoolBounds::http()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_critical_utilization")]
    pub critical_utilization: f64,

    #[serde(default = "default_high_utilization")]
    pub high_utilization: f64,

    #[serde(default = "default_low_utilization")]
    pub low_utilization: f64,

    #[serde(default = "default_critical_growth_factor")]
    pub critical_growth_factor: f64,

    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,

    #[serde(default = "default_shrink_factor")]
    pub shrink_factor: f64,

    /// Idle slots must exceed this before cleanup kicks in
    #[serde(default = "default_idle_cleanup_threshold")]
    pub idle_cleanup_threshold: u32,

    #[serde(default = "default_idle_ttl_ms")]
    pub idle_ttl_ms: u64,

    #[serde(default = "default_database_bounds")]
    pub database: PoolBounds,

    #[serde(default = "default_http_bounds")]
    pub http: PoolBounds,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    30000
}

fn default_critical_utilization() -> f64 {
    0.95
}

fn default_high_utilization() -> f64 {
    0.80
}

fn default_low_utilization() -> f64 {
    0.30
}

fn default_critical_growth_factor() -> f64 {
    1.2
}

fn default_growth_factor() -> f64 {
    1.1
}

fn default_shrink_factor() -> f64 {
    0.8
}

fn default_idle_cleanup_threshold() -> u32 {
    5
}

fn default_idle_ttl_ms() -> u64 {
    30000
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_ms: default_interval_ms(),
            critical_utilization: default_critical_utilization(),
            high_utilization: default_high_utilization(),
            low_utilization: default_low_utilization(),
            critical_growth_factor: default_critical_growth_factor(),
            growth_factor: default_growth_factor(),
            shrink_factor: default_shrink_factor(),
            idle_cleanup_threshold: default_idle_cleanup_threshold(),
            idle_ttl_ms: default_idle_ttl_ms(),
            database: PoolBounds::database(),
            http: PoolBounds::http(),
        }
    }
}

impl TunerConfig {
    pub fn bounds_for(&self, kind: PoolKind) -> PoolBounds {
        match kind {
            PoolKind::Database => self.database,
            PoolKind::Http => self.http,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_millis(self.idle_ttl_ms)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        self.database.validate()?;
        self.http.validate()?;

        let thresholds_ordered = 0.0 <= self.low_utilization
            && self.low_utilization < self.high_utilization
            && self.high_utilization < self.critical_utilization
            && self.critical_utilization <= 1.0;
        if !thresholds_ordered {
            return Err(PoolError::InvalidBounds(format!(
                "thresholds must satisfy 0 <= low ({}) < high ({}) < critical ({}) <= 1",
                self.low_utilization, self.high_utilization, self.critical_utilization
            )));
        }
        if self.growth_factor < 1.0 || self.critical_growth_factor < 1.0 {
            return Err(PoolError::InvalidBounds(
                "growth factors must be at least 1.0".to_string(),
            ));
        }
        if !(0.0 < self.shrink_factor && self.shrink_factor <= 1.0) {
            return Err(PoolError::InvalidBounds(
                "shrink_factor must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Starting size of one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSizing {
    pub max_size: u32,
    #[serde(default)]
    pub min_idle: u32,
}

fn default_database_sizing() -> PoolSizing {
    PoolSizing {
        max_size: 20,
        min_idle: 2,
    }
}

fn default_http_sizing() -> PoolSizing {
    PoolSizing {
        max_size: 50,
        min_idle: 5,
    }
}

/// Initial sizes of the shared pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolsConfig {
    #[serde(default = "default_database_sizing")]
    pub database: PoolSizing,

    #[serde(default = "default_http_sizing")]
    pub http: PoolSizing,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            database: default_database_sizing(),
            http: default_http_sizing(),
        }
    }
}

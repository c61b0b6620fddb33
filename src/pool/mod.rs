//! Connection pools and the pool tuner
//!
//! This module contains:
//! - `managed` - Slot-based connection pools adapters lease from
//! - `config` - Tuner thresholds and per-kind size bounds
//! - `tuner` - The periodic control loop that resizes pools

pub mod config;
pub mod managed;
pub mod tuner;

pub use config::{PoolBounds, PoolSizing, PoolsConfig, TunerConfig};
pub use managed::{ManagedPool, PoolKind, PoolLease, PoolStats, TunablePool};
pub use tuner::{plan, PoolTuner, TunerHandle, TuningAction, TuningPlan, TuningReport};

/// Errors raised by pool management
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolError {
    #[error("Timed out after {waited_ms}ms waiting for a connection from pool '{pool}'")]
    AcquireTimeout { pool: String, waited_ms: u64 },

    #[error("Pool '{0}' is closed")]
    Closed(String),

    #[error("Invalid pool size for '{pool}': max {max_size}, min idle {min_idle}")]
    InvalidSize {
        pool: String,
        max_size: u32,
        min_idle: u32,
    },

    #[error("Invalid pool bounds: {0}")]
    InvalidBounds(String),
}

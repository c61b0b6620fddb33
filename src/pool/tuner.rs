//! Connection pool tuner
//!
//! A periodic control loop that reads each registered pool's utilization and
//! grows or shrinks it within its bounds. Tuning is advisory: it changes
//! capacity for future leases and never blocks a request.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::config::{PoolBounds, TunerConfig};
use super::PoolError;
use super::managed::{PoolKind, PoolStats, TunablePool};

/// Float slack so 20 × 1.2 = 24.000000000000004 rounds to 24
const ROUNDING_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TuningAction {
    /// Saturated with waiters
    CriticalGrow,
    Grow,
    Shrink,
    Hold,
}

/// Pure tuning decision for one pool
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningPlan {
    pub action: TuningAction,
    pub utilization: f64,
    pub max_size: u32,
    pub min_idle: u32,
    pub evict_idle: bool,
}

impl TuningPlan {
    pub fn resizes(&self, stats: &PoolStats) -> bool {
        self.max_size != stats.max_size || self.min_idle != stats.min_idle
    }
}

fn grow(value: u32, factor: f64) -> u32 {
    (value as f64 * factor - ROUNDING_EPSILON).ceil() as u32
}

fn shrink(value: u32, factor: f64) -> u32 {
    (value as f64 * factor + ROUNDING_EPSILON).floor() as u32
}

/// Decide the next size of a pool from its current counters
pub fn plan(stats: &PoolStats, bounds: &PoolBounds, config: &TunerConfig) -> TuningPlan {
    let utilization = stats.utilization();
    let evict_idle = stats.idle > stats.active.saturating_mul(2)
        && stats.idle > config.idle_cleanup_threshold;

    let (action, max_size, min_idle) =
        if utilization > config.critical_utilization && stats.waiting > 0 {
            let max_size = bounds.clamp(grow(stats.max_size, config.critical_growth_factor));
            let min_idle = grow(stats.min_idle, config.critical_growth_factor).min(max_size);
            (TuningAction::CriticalGrow, max_size, min_idle)
        } else if utilization > config.high_utilization {
            let max_size = bounds.clamp(grow(stats.max_size, config.growth_factor));
            (TuningAction::Grow, max_size, stats.min_idle.min(max_size))
        } else if utilization < config.low_utilization && stats.max_size > bounds.min_size {
            let max_size = bounds.clamp(shrink(stats.max_size, config.shrink_factor));
            let min_idle = shrink(stats.min_idle, config.shrink_factor)
                .max(bounds.min_idle)
                .min(max_size);
            (TuningAction::Shrink, max_size, min_idle)
        } else {
            let max_size = bounds.clamp(stats.max_size);
            (TuningAction::Hold, max_size, stats.min_idle.min(max_size))
        };

    TuningPlan {
        action,
        utilization,
        max_size,
        min_idle,
        evict_idle,
    }
}

/// What one tuning cycle did to one pool
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningReport {
    pub pool: String,
    pub kind: PoolKind,
    pub before: PoolStats,
    pub plan: TuningPlan,
    pub resized: bool,
    pub evicted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct PoolTuner {
    config: TunerConfig,
    pools: Mutex<Vec<Arc<dyn TunablePool>>>,
}

impl PoolTuner {
    /// Fails on inverted bounds or out-of-order thresholds
    pub fn new(config: TunerConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            config,
            pools: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn register(&self, pool: Arc<dyn TunablePool>) {
        info!("Registered {} pool '{}' for tuning", pool.kind(), pool.name());
        self.pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pool);
    }

    /// Tune every registered pool once; per-pool failures are recorded, not raised
    pub fn run_cycle(&self) -> Vec<TuningReport> {
        let pools: Vec<_> = self
            .pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        pools.iter().map(|pool| self.tune(pool.as_ref())).collect()
    }

    fn tune(&self, pool: &dyn TunablePool) -> TuningReport {
        let before = pool.stats();
        let bounds = self.config.bounds_for(pool.kind());
        let plan = plan(&before, &bounds, &self.config);

        let mut report = TuningReport {
            pool: pool.name().to_string(),
            kind: pool.kind(),
            before,
            plan,
            resized: false,
            evicted: 0,
            error: None,
        };

        if plan.resizes(&before) {
            match pool.resize(plan.max_size, plan.min_idle) {
                Ok(()) => {
                    info!(
                        "{:?} pool '{}' at {:.0}% utilization: max {} -> {}, min idle {} -> {}",
                        plan.action,
                        pool.name(),
                        plan.utilization * 100.0,
                        before.max_size,
                        plan.max_size,
                        before.min_idle,
                        plan.min_idle
                    );
                    report.resized = true;
                }
                Err(e) => {
                    warn!("Failed to resize pool '{}': {}", pool.name(), e);
                    report.error = Some(e.to_string());
                }
            }
        }

        if plan.evict_idle {
            match pool.evict_idle(self.config.idle_ttl()) {
                Ok(evicted) => {
                    if evicted > 0 {
                        debug!("Evicted {} idle slot(s) from pool '{}'", evicted, pool.name());
                    }
                    report.evicted = evicted;
                }
                Err(e) => {
                    warn!("Idle cleanup failed for pool '{}': {}", pool.name(), e);
                    report.error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        report
    }

    /// Run cycles on a fixed interval until the handle is stopped
    pub fn spawn(self: Arc<Self>) -> TunerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = self.config.interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Pool tuner started (interval {:?})", period);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        self.run_cycle();
                    }
                }
            }
            info!("Pool tuner stopped");
        });

        TunerHandle {
            stop_tx: Some(stop_tx),
            task,
        }
    }
}

/// Handle to a running tuner loop
pub struct TunerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TunerHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Pool tuner task ended abnormally: {}", e);
        }
    }
}

impl Drop for TunerHandle {
    fn drop(&mut self) {
        if self.stop_tx.is_some() {
            self.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(active: u32, idle: u32, waiting: u32, max_size: u32, min_idle: u32) -> PoolStats {
        PoolStats {
            active,
            idle,
            waiting,
            max_size,
            min_idle,
        }
    }

    #[test]
    fn test_critical_growth() {
        let config = TunerConfig::default();
        let p = plan(&stats(20, 0, 4, 20, 2), &PoolBounds::database(), &config);
        assert_eq!(p.action, TuningAction::CriticalGrow);
        assert_eq!(p.max_size, 24);
        assert_eq!(p.min_idle, 3);
    }

    #[test]
    fn test_saturated_without_waiters_grows_proactively() {
        let config = TunerConfig::default();
        let p = plan(&stats(20, 0, 0, 20, 2), &PoolBounds::database(), &config);
        assert_eq!(p.action, TuningAction::Grow);
        assert_eq!(p.max_size, 22);
        assert_eq!(p.min_idle, 2);
    }

    #[test]
    fn test_growth_capped_at_max() {
        let config = TunerConfig::default();
        let p = plan(&stats(48, 0, 9, 48, 2), &PoolBounds::database(), &config);
        assert_eq!(p.max_size, 50);
    }

    #[test]
    fn test_shrink_floors_at_min() {
        let config = TunerConfig::default();
        let p = plan(&stats(0, 0, 0, 6, 4), &PoolBounds::database(), &config);
        assert_eq!(p.action, TuningAction::Shrink);
        assert_eq!(p.max_size, 5);
        assert_eq!(p.min_idle, 3);

        let at_min = plan(&stats(0, 0, 0, 5, 2), &PoolBounds::database(), &config);
        assert_eq!(at_min.action, TuningAction::Hold);
        assert_eq!(at_min.max_size, 5);
    }

    #[test]
    fn test_idle_cleanup_condition() {
        let config = TunerConfig::default();
        assert!(plan(&stats(2, 6, 0, 40, 2), &PoolBounds::database(), &config).evict_idle);
        assert!(!plan(&stats(3, 6, 0, 40, 2), &PoolBounds::database(), &config).evict_idle);
        assert!(!plan(&stats(0, 5, 0, 40, 2), &PoolBounds::database(), &config).evict_idle);
    }
}

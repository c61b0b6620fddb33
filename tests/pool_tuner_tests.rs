use integration_flows::pool::{
    ManagedPool, PoolError, PoolKind, PoolStats, PoolTuner, TunablePool, TunerConfig, TuningAction,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pool that reports fixed load and applies resizes to its counters
struct LoadedPool {
    name: String,
    kind: PoolKind,
    stats: Mutex<PoolStats>,
}

impl LoadedPool {
    fn new(kind: PoolKind, stats: PoolStats) -> Arc<Self> {
        Arc::new(Self {
            name: format!("{}-fake", kind),
            kind,
            stats: Mutex::new(stats),
        })
    }

    /// Keep the same share of the pool leased after a resize
    fn set_utilization(&self, share: f64) {
        let mut stats = self.stats.lock().unwrap();
        stats.active = (stats.max_size as f64 * share).round() as u32;
    }
}

impl TunablePool for LoadedPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PoolKind {
        self.kind
    }

    fn stats(&self) -> PoolStats {
        *self.stats.lock().unwrap()
    }

    fn resize(&self, max_size: u32, min_idle: u32) -> Result<(), PoolError> {
        let mut stats = self.stats.lock().unwrap();
        stats.max_size = max_size;
        stats.min_idle = min_idle;
        Ok(())
    }

    fn evict_idle(&self, _ttl: Duration) -> Result<usize, PoolError> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_saturated_database_pool_grows_by_a_fifth() {
    let pool = ManagedPool::new("database", PoolKind::Database, 20, 2).unwrap();
    let mut leases = Vec::new();
    for _ in 0..20 {
        leases.push(pool.acquire(Duration::from_millis(50)).await.unwrap());
    }

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(pool.stats().waiting, 1);

    let tuner = PoolTuner::new(TunerConfig::default()).unwrap();
    tuner.register(pool.clone());
    let reports = tuner.run_cycle();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].plan.action, TuningAction::CriticalGrow);
    assert!(reports[0].resized);
    assert_eq!(pool.stats().max_size, 24);

    let lease = waiter.await.unwrap();
    assert!(lease.is_ok());
}

#[test]
fn test_critical_growth_is_capped() {
    let pool = LoadedPool::new(
        PoolKind::Database,
        PoolStats {
            active: 43,
            idle: 0,
            waiting: 7,
            max_size: 45,
            min_idle: 2,
        },
    );
    let tuner = PoolTuner::new(TunerConfig::default()).unwrap();
    tuner.register(pool.clone());

    tuner.run_cycle();
    assert_eq!(pool.stats().max_size, 50);
}

#[test]
fn test_repeated_pressure_respects_bounds() {
    let config = TunerConfig::default();
    let tuner = PoolTuner::new(config.clone()).unwrap();

    let hot = LoadedPool::new(
        PoolKind::Http,
        PoolStats {
            active: 50,
            idle: 0,
            waiting: 10,
            max_size: 50,
            min_idle: 5,
        },
    );
    let cold = LoadedPool::new(
        PoolKind::Database,
        PoolStats {
            active: 1,
            idle: 19,
            waiting: 0,
            max_size: 20,
            min_idle: 4,
        },
    );
    tuner.register(hot.clone());
    tuner.register(cold.clone());

    for _ in 0..40 {
        tuner.run_cycle();
        hot.set_utilization(1.0);
        cold.set_utilization(0.0);

        let hot_stats = hot.stats();
        let cold_stats = cold.stats();
        assert!(hot_stats.max_size <= config.bounds_for(PoolKind::Http).max_size);
        assert!(cold_stats.max_size >= config.bounds_for(PoolKind::Database).min_size);
        assert!(cold_stats.min_idle >= config.bounds_for(PoolKind::Database).min_idle);
    }

    assert_eq!(hot.stats().max_size, 200);
    assert_eq!(cold.stats().max_size, 5);
}

#[test]
fn test_idle_pool_in_band_holds() {
    let pool = LoadedPool::new(
        PoolKind::Http,
        PoolStats {
            active: 25,
            idle: 5,
            waiting: 0,
            max_size: 50,
            min_idle: 5,
        },
    );
    let tuner = PoolTuner::new(TunerConfig::default()).unwrap();
    tuner.register(pool.clone());

    let reports = tuner.run_cycle();
    assert_eq!(reports[0].plan.action, TuningAction::Hold);
    assert!(!reports[0].resized);
    assert_eq!(pool.stats().max_size, 50);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_tuner_runs_on_interval() {
    let pool = LoadedPool::new(
        PoolKind::Database,
        PoolStats {
            active: 20,
            idle: 0,
            waiting: 3,
            max_size: 20,
            min_idle: 2,
        },
    );
    let config = TunerConfig {
        interval_ms: 1000,
        ..TunerConfig::default()
    };
    let tuner = Arc::new(PoolTuner::new(config).unwrap());
    tuner.register(pool.clone());

    let handle = tuner.spawn();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.stop().await;

    assert_eq!(pool.stats().max_size, 24);
}

#[test]
fn test_tuner_rejects_inverted_bounds() {
    let mut config = TunerConfig::default();
    config.database.min_size = 60;

    assert!(matches!(PoolTuner::new(config), Err(PoolError::InvalidBounds(_))));
}

#[tokio::test]
async fn test_abandoned_lease_leaves_no_phantom_waiter() {
    let pool = ManagedPool::new("database", PoolKind::Database, 20, 2).unwrap();
    let mut leases = Vec::new();
    for _ in 0..20 {
        leases.push(pool.acquire(Duration::from_millis(50)).await.unwrap());
    }

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), pool.acquire(Duration::from_secs(10))).await;
    assert!(abandoned.is_err());
    assert_eq!(pool.stats().waiting, 0);

    let tuner = PoolTuner::new(TunerConfig::default()).unwrap();
    tuner.register(pool.clone());
    let reports = tuner.run_cycle();

    assert_eq!(reports[0].plan.action, TuningAction::Grow);
    assert_eq!(pool.stats().max_size, 22);
}

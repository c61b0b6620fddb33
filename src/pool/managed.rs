//! Managed connection-slot pools
//!
//! A pool tracks leased (active) and idle slots. Leasing reuses an idle slot,
//! opens a new one while under `max_size`, or waits for a release. Sizes can
//! change at runtime; the tuner relies on that.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::debug;

use super::PoolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolKind {
    Database,
    Http,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Database => write!(f, "DATABASE"),
            PoolKind::Http => write!(f, "HTTP"),
        }
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub active: u32,
    pub idle: u32,
    pub waiting: u32,
    pub max_size: u32,
    pub min_idle: u32,
}

impl PoolStats {
    /// Leased share of the configured size; 0 for an empty pool
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active as f64 / self.max_size as f64
        }
    }
}

/// A pool whose capacity the tuner may adjust
pub trait TunablePool: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> PoolKind;

    fn stats(&self) -> PoolStats;

    fn resize(&self, max_size: u32, min_idle: u32) -> Result<(), PoolError>;

    /// Close idle slots unused for longer than `ttl`, keeping `min_idle`
    fn evict_idle(&self, ttl: Duration) -> Result<usize, PoolError>;
}

#[derive(Debug)]
struct PoolState {
    active: u32,
    /// Release time of each idle slot, oldest first
    idle: VecDeque<Instant>,
    waiting: u32,
    max_size: u32,
    min_idle: u32,
    closed: bool,
}

/// Thread-safe pool of connection slots
#[derive(Debug)]
pub struct ManagedPool {
    name: String,
    kind: PoolKind,
    state: Mutex<PoolState>,
    released: Notify,
}

impl ManagedPool {
    pub fn new(
        name: impl Into<String>,
        kind: PoolKind,
        max_size: u32,
        min_idle: u32,
    ) -> Result<Arc<Self>, PoolError> {
        let name = name.into();
        validate_size(&name, max_size, min_idle)?;
        Ok(Arc::new(Self {
            name,
            kind,
            state: Mutex::new(PoolState {
                active: 0,
                idle: VecDeque::new(),
                waiting: 0,
                max_size,
                min_idle,
                closed: false,
            }),
            released: Notify::new(),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease a slot, waiting up to `timeout` for one to free up
    pub async fn acquire(self: &Arc<Self>, timeout: Duration) -> Result<PoolLease, PoolError> {
        let deadline = tokio::time::Instant::now() + timeout;
        // Dropped on every exit, cancellation included
        let mut queued: Option<WaitingGuard<'_>> = None;

        loop {
            {
                let mut state = self.lock();
                if state.closed {
                    return Err(PoolError::Closed(self.name.clone()));
                }

                let total = state.active + state.idle.len() as u32;
                let available = state.idle.pop_back().is_some() || total < state.max_size;
                if available {
                    state.active += 1;
                    return Ok(PoolLease {
                        pool: Arc::clone(self),
                    });
                }

                if queued.is_none() {
                    state.waiting += 1;
                    queued = Some(WaitingGuard { pool: self });
                }
            }

            if tokio::time::timeout_at(deadline, self.released.notified())
                .await
                .is_err()
            {
                debug!("Pool '{}' lease timed out after {:?}", self.name, timeout);
                return Err(PoolError::AcquireTimeout {
                    pool: self.name.clone(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
        }
    }

    fn release(&self) {
        {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
            let total = state.active + state.idle.len() as u32;
            // Surplus slots after a shrink are closed instead of parked
            if !state.closed && total < state.max_size {
                state.idle.push_back(Instant::now());
            }
        }
        self.released.notify_one();
    }

    /// Reject new leases and wake every waiter
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.idle.clear();
        }
        self.released.notify_waiters();
        self.released.notify_one();
    }
}

fn validate_size(name: &str, max_size: u32, min_idle: u32) -> Result<(), PoolError> {
    if max_size == 0 || min_idle > max_size {
        return Err(PoolError::InvalidSize {
            pool: name.to_string(),
            max_size,
            min_idle,
        });
    }
    Ok(())
}

impl TunablePool for ManagedPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PoolKind {
        self.kind
    }

    fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            active: state.active,
            idle: state.idle.len() as u32,
            waiting: state.waiting,
            max_size: state.max_size,
            min_idle: state.min_idle,
        }
    }

    fn resize(&self, max_size: u32, min_idle: u32) -> Result<(), PoolError> {
        validate_size(&self.name, max_size, min_idle)?;
        let grew = {
            let mut state = self.lock();
            if state.closed {
                return Err(PoolError::Closed(self.name.clone()));
            }
            let grew = max_size > state.max_size;
            state.max_size = max_size;
            state.min_idle = min_idle;

            while state.active + state.idle.len() as u32 > max_size && !state.idle.is_empty() {
                state.idle.pop_front();
            }
            grew
        };

        if grew {
            self.released.notify_waiters();
            self.released.notify_one();
        }
        Ok(())
    }

    fn evict_idle(&self, ttl: Duration) -> Result<usize, PoolError> {
        let mut state = self.lock();
        let now = Instant::now();
        let mut evicted = 0;

        while state.idle.len() as u32 > state.min_idle {
            match state.idle.front() {
                Some(released) if now.duration_since(*released) > ttl => {
                    state.idle.pop_front();
                    evicted += 1;
                }
                _ => break,
            }
        }
        Ok(evicted)
    }
}

struct WaitingGuard<'a> {
    pool: &'a ManagedPool,
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.pool.lock();
        state.waiting = state.waiting.saturating_sub(1);
    }
}

/// A leased slot; returned to the pool on drop
#[derive(Debug)]
pub struct PoolLease {
    pool: Arc<ManagedPool>,
}

impl PoolLease {
    pub fn pool_name(&self) -> &str {
        &self.pool.name
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pool.release();
    }
}

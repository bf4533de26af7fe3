//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Live connections plus slots reserved for connections being opened
    total: usize,
    idle: usize,
    /// Connections checked out by callers
    active: usize,
    /// Callers blocked in `acquire` waiting for capacity
    waiting: usize,
    max_size: usize,
}

impl PoolStats {
    pub fn new(total: usize, idle: usize, active: usize, waiting: usize, max_size: usize) -> Self {
        Self {
            total,
            idle,
            active,
            waiting,
            max_size,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Share of live connections that are checked out (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.active as f64 / self.total as f64
        }
    }

    /// True when no idle connection is left and no new one may be opened
    pub fn is_exhausted(&self) -> bool {
        self.idle == 0 && self.total >= self.max_size
    }
}

//! In-memory alert history
//!
//! A ring buffer with a fixed capacity. When the buffer is full, the oldest alert is
//! evicted; nothing else ever removes an entry except an explicit clear.
//!
//! ## Limitations
//!
//! - **No persistence**: All alerts are lost on restart
//! - **Single owner**: Not synchronised; the store actor owns the only instance

use std::collections::VecDeque;

use tracing::trace;

use crate::AlertEvent;

/// Maximum number of alerts kept in history
pub const ALERT_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct AlertStore {
    alerts: VecDeque<AlertEvent>,
    capacity: usize,
    evicted: u64,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::with_capacity(ALERT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            alerts: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append an alert, evicting the oldest entry if the store is full
    ///
    /// Returns the evicted alert, if any.
    pub fn append(&mut self, alert: AlertEvent) -> Option<AlertEvent> {
        self.alerts.push_back(alert);

        if self.alerts.len() > self.capacity {
            let evicted = self.alerts.pop_front();
            if let Some(evicted) = &evicted {
                self.evicted += 1;
                trace!("alert store full, evicted alert #{}", evicted.id);
            }
            return evicted;
        }

        None
    }

    /// Remove every alert, returning how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.alerts.len();
        self.alerts.clear();
        removed
    }

    /// All alerts, oldest first
    pub fn all(&self) -> Vec<AlertEvent> {
        self.alerts.iter().cloned().collect()
    }

    /// The `limit` most recent alerts, oldest first
    pub fn latest(&self, limit: usize) -> Vec<AlertEvent> {
        let skip = self.alerts.len().saturating_sub(limit);
        self.alerts.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total evictions since start
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new()
    }
}

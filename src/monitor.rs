// src/monitor.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Consecutive failed commands before the device is considered gone.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Shared, read-only view of whether the controller is talking to hardware.
#[derive(Clone, Debug, Default)]
pub struct ConnectionStatus(Arc<AtomicBool>);

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::Release);
    }
}

// ----------------------------------------------------------------------
// Link monitor
// ----------------------------------------------------------------------
/// Tracks command outcomes and flips the shared status once the device has
/// failed [`FAILURE_THRESHOLD`] commands in a row.
#[derive(Debug)]
pub struct LinkMonitor {
    status: ConnectionStatus,
    consecutive_failures: u32,
    threshold: u32,
}

impl LinkMonitor {
    pub fn new(status: ConnectionStatus) -> Self {
        Self::with_threshold(status, FAILURE_THRESHOLD)
    }

    pub fn with_threshold(status: ConnectionStatus, threshold: u32) -> Self {
        Self {
            status,
            consecutive_failures: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            log::info!("Monitor: Device responding again. Cleared {} failures.", self.consecutive_failures);
            self.consecutive_failures = 0;
        }
    }

    /// Returns `true` when this failure took the link down.
    pub fn record_failure(&mut self) -> bool {
        if !self.status.is_connected() {
            return false;
        }
        self.consecutive_failures += 1;
        log::error!("Monitor: Device command failed ({}/{})", self.consecutive_failures, self.threshold);

        if self.consecutive_failures >= self.threshold {
            log::error!("Monitor: Hit failure threshold. Running disconnected until reconnect.");
            self.status.set(false);
            return true;
        }
        false
    }

    /// Result of a (re)connect attempt.
    pub fn reset(&mut self, connected: bool) {
        self.consecutive_failures = 0;
        self.status.set(connected);
    }
}

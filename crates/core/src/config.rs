use std::time::Duration;

use crate::policy::Mode;

/// Every delay the scan loop waits on.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTimings {
    /// Wait after a click before re-checking visibility
    pub settle_delay: Duration,
    /// Quiet period before a mutation-triggered re-scan
    pub mutation_debounce: Duration,
    pub fast_poll_interval: Duration,
    pub fast_poll_count: u32,
    /// Low-frequency fallback poll for the rest of the page lifetime
    pub periodic_interval: Duration,
    /// Window left for late scripts after installing the consent shim
    pub shim_grace: Duration,
    /// Embedded frames smaller than this in either dimension are not scanned
    pub min_frame_size: f64,
}

impl Default for ScanTimings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            mutation_debounce: Duration::from_millis(200),
            fast_poll_interval: Duration::from_millis(500),
            fast_poll_count: 10,
            periodic_interval: Duration::from_millis(5000),
            shim_grace: Duration::from_millis(100),
            min_frame_size: 200.0,
        }
    }
}

impl ScanTimings {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Normal => Self::default(),
            Mode::Extreme => Self::extreme(),
        }
    }

    pub fn extreme() -> Self {
        Self {
            periodic_interval: Duration::from_millis(2000),
            ..Self::default()
        }
    }

    pub fn with_settle_delay(mut self, ms: u64) -> Self {
        self.settle_delay = Duration::from_millis(ms);
        self
    }

    pub fn with_periodic_interval(mut self, ms: u64) -> Self {
        self.periodic_interval = Duration::from_millis(ms);
        self
    }

    pub fn with_fast_polls(mut self, count: u32, interval_ms: u64) -> Self {
        self.fast_poll_count = count;
        self.fast_poll_interval = Duration::from_millis(interval_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extreme_polls_faster() {
        let normal = ScanTimings::for_mode(Mode::Normal);
        let extreme = ScanTimings::for_mode(Mode::Extreme);
        assert!(extreme.periodic_interval < normal.periodic_interval);
        assert_eq!(extreme.settle_delay, normal.settle_delay);
    }
}

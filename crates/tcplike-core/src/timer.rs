//! Adaptive retransmission timeout.
//!
//! EWMA estimator over measured round trips:
//!
//! ```text
//! estimatedRTT = 7/8 * estimatedRTT + 1/8 * sample
//! devRTT       = 3/4 * devRTT       + 1/4 * |sample - estimatedRTT|
//! timeout      = estimatedRTT + 4 * devRTT
//! ```
//!
//! The deviation uses the freshly updated estimate. The timeout has no floor
//! or ceiling. Callers feed samples only for packets that were never
//! retransmitted (Karn's algorithm).

use std::time::Duration;

const ALPHA: f64 = 0.125;
const BETA: f64 = 0.25;

pub const DEFAULT_INITIAL_TIMEOUT: Duration = Duration::from_millis(1000);

/// All values are milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct RetransmissionTimer {
    estimated_rtt: f64,
    dev_rtt: f64,
    timeout: f64,
}

impl Default for RetransmissionTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RetransmissionTimer {
    pub fn new() -> Self {
        Self::with_initial(DEFAULT_INITIAL_TIMEOUT)
    }

    /// Start with `estimatedRTT = timeout = initial` and no deviation.
    pub fn with_initial(initial: Duration) -> Self {
        let ms = as_millis_f64(initial);
        Self {
            estimated_rtt: ms,
            dev_rtt: 0.0,
            timeout: ms,
        }
    }

    pub fn record_rtt_sample(&mut self, sample: Duration) {
        let sample = as_millis_f64(sample);
        self.estimated_rtt = (1.0 - ALPHA) * self.estimated_rtt + ALPHA * sample;
        self.dev_rtt = (1.0 - BETA) * self.dev_rtt + BETA * (sample - self.estimated_rtt).abs();
        self.timeout = self.estimated_rtt + 4.0 * self.dev_rtt;
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout / 1000.0)
    }

    pub fn estimated_rtt_ms(&self) -> f64 {
        self.estimated_rtt
    }

    pub fn dev_rtt_ms(&self) -> f64 {
        self.dev_rtt
    }

    pub fn timeout_ms(&self) -> f64 {
        self.timeout
    }
}

fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

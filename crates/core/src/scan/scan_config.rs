use std::time::Duration;

use crate::shared::constants::{
    BIND_POLL_INTERVAL, BIND_TIMEOUT, DEFAULT_POLL_INTERVAL, NOTIFICATION_TTL, PRESENTATION_DELAY,
    UPLOAD_ANALYSIS_DELAY,
};

/// Timing knobs for the scan flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    pub poll_interval: Duration,
    pub presentation_delay: Duration,
    pub notification_ttl: Duration,
    pub upload_analysis_delay: Duration,
    pub bind_timeout: Duration,
    pub bind_poll_interval: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            presentation_delay: PRESENTATION_DELAY,
            notification_ttl: NOTIFICATION_TTL,
            upload_analysis_delay: UPLOAD_ANALYSIS_DELAY,
            bind_timeout: BIND_TIMEOUT,
            bind_poll_interval: BIND_POLL_INTERVAL,
        }
    }
}

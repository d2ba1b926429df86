use crate::Result;
use onboard_connect::config::millis;
use onboard_connect::SessionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a poller drives its connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Target time from the start of one refresh to the start of the next
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
    /// Minimum pause between two refreshes, whatever their outcome
    #[serde(rename = "min_sleep_ms", with = "millis")]
    pub min_sleep: Duration,
    /// How long `init()` waits for the first refresh
    #[serde(rename = "ready_timeout_ms", with = "millis")]
    pub ready_timeout: Duration,
    /// Treat a failed first refresh as a connection error
    pub require_initial_refresh: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            min_sleep: Duration::from_millis(50),
            ready_timeout: Duration::from_secs(15),
            require_initial_refresh: true,
        }
    }
}

impl PollerConfig {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn min_sleep(mut self, min_sleep: Duration) -> Self {
        self.min_sleep = min_sleep;
        self
    }

    pub fn ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    pub fn require_initial_refresh(mut self, require: bool) -> Self {
        self.require_initial_refresh = require;
        self
    }

    /// How long to sleep after a refresh that took `elapsed`.
    pub fn sleep_after(&self, elapsed: Duration) -> Duration {
        self.interval.saturating_sub(elapsed).max(self.min_sleep)
    }
}

/// Everything needed to assemble a vehicle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub session: SessionConfig,
    pub poller: PollerConfig,
}

impl VehicleConfig {
    pub fn load(json_content: &str) -> Result<Self> {
        let config: VehicleConfig = serde_json::from_str(json_content)?;
        Ok(config)
    }
}

use std::time::Duration;

/// Tuning knobs of an [`InfernumEngine`](crate::InfernumEngine).
#[derive(Clone, Debug, PartialEq)]
pub struct InfernumEngineConfig {
    /// How long the worker waits for a request before checking for shutdown again.
    pub poll_interval: Duration,
    /// How long a finished result is kept when nobody claims it.
    ///
    /// Expired results are dropped when the worker sweeps, which happens on
    /// idle polls and before each new result is stored. A result is therefore
    /// never dropped in the same pass that stores it, even with a zero TTL.
    pub unclaimed_ttl: Duration,
    /// Timeout applied by `await_result` when the caller passes none.
    /// `None` waits until the result arrives.
    pub default_timeout: Option<Duration>,
}

impl Default for InfernumEngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            unclaimed_ttl: Duration::from_secs(300),
            default_timeout: None,
        }
    }
}

impl InfernumEngineConfig {
    /// Sets how often the idle worker wakes up to check for shutdown.
    ///
    /// # Arguments
    /// * `poll_interval` - Upper bound on a single wait for the next request
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets how long an unclaimed result is retained before it is discarded.
    ///
    /// # Arguments
    /// * `unclaimed_ttl` - Retention period, counted from when the result is stored
    pub fn with_unclaimed_ttl(mut self, unclaimed_ttl: Duration) -> Self {
        self.unclaimed_ttl = unclaimed_ttl;
        self
    }

    /// Sets the timeout used by `await_result` when the caller passes `None`.
    ///
    /// # Arguments
    /// * `default_timeout` - How long a caller waits before getting `TimedOut`
    pub fn with_default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = Some(default_timeout);
        self
    }
}

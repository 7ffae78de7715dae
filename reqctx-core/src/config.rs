use std::time::Duration;

/// Configuration for the background sweeper
///
/// # Example
///
/// ```rust
/// use reqctx_core::SweepConfig;
/// use std::time::Duration;
///
/// let config = SweepConfig::default()
///     .with_interval(Duration::from_secs(30))
///     .with_max_age(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Interval between purge runs (default: 60 seconds)
    pub interval: Duration,
    /// Slots older than this many seconds are purged (default: 300).
    /// Zero or negative wipes the whole store on every run.
    pub max_age_secs: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_age_secs: 300,
        }
    }
}

impl SweepConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how often the sweeper runs
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the slot age past which the sweeper reclaims it
    ///
    /// Partial seconds round up and the result is at least one second, so
    /// this never selects the full reset; use
    /// [`with_max_age_secs`](SweepConfig::with_max_age_secs) with `0` for
    /// that. Ages beyond `i64::MAX` seconds saturate.
    ///
    /// # Example
    ///
    /// ```rust
    /// use reqctx_core::SweepConfig;
    /// use std::time::Duration;
    ///
    /// // Anything alive for more than 10 minutes is considered leaked
    /// let config = SweepConfig::default()
    ///     .with_max_age(Duration::from_secs(600));
    /// assert_eq!(config.max_age_secs, 600);
    /// ```
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        let secs = max_age
            .as_secs()
            .saturating_add(u64::from(max_age.subsec_nanos() > 0))
            .max(1);
        self.max_age_secs = i64::try_from(secs).unwrap_or(i64::MAX);
        self
    }

    /// Sets the raw age threshold in seconds; `<= 0` means full reset
    pub fn with_max_age_secs(mut self, max_age_secs: i64) -> Self {
        self.max_age_secs = max_age_secs;
        self
    }
}

//! Tunables for the fairness correction around the blocking wait.

/// Nice value a waiting thread is raised to by default.
pub const DEFAULT_BOOST: i32 = -10;

/// Multiplexor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Nice value to raise the caller to for the duration of a blocking
    /// wait. `None` leaves the priority alone.
    pub boost: Option<i32>,
    /// Yield once after a blocking wait is woken, so the thread that woke
    /// us can run first.
    pub yield_after_wake: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            boost: Some(DEFAULT_BOOST),
            yield_after_wake: true,
        }
    }
}

impl Config {
    pub fn with_boost(mut self, nice: i32) -> Self {
        self.boost = Some(nice);
        self
    }

    pub fn without_boost(mut self) -> Self {
        self.boost = None;
        self
    }

    pub fn yield_after_wake(mut self, enabled: bool) -> Self {
        self.yield_after_wake = enabled;
        self
    }
}

use crate::constants::SETTLE_TIME_MS;

/// Timing settings for the SPS30 sensor link.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    /// Time to wait between sending a command and reading the reply, in milliseconds.
    pub settle_time_ms: u32,
    /// Time to wait between the two frames of the wake-up sequence, in milliseconds.
    pub wake_interval_ms: u32,
}

impl Config {
    /// Creates a new `Config` instance.
    ///
    /// # Arguments
    ///
    /// * `settle_time_ms` - The wait between a command and its reply.
    /// * `wake_interval_ms` - The wait between the two wake-up frames.
    ///
    /// # Returns
    ///
    /// A new `Config` instance with the specified timings.
    pub fn new(settle_time_ms: u32, wake_interval_ms: u32) -> Config {
        Config {
            settle_time_ms,
            wake_interval_ms,
        }
    }
    /// Sets the settle time for the configuration.
    ///
    /// # Arguments
    ///
    /// * `settle_time_ms` - The settle time to set, in milliseconds.
    ///
    /// # Returns
    ///
    /// The updated `Config` instance.
    pub fn settle_time_ms(mut self, settle_time_ms: u32) -> Self {
        self.settle_time_ms = settle_time_ms;
        self
    }
    /// Sets the interval between the two wake-up frames.
    ///
    /// The sensor only wakes its UART if the second frame arrives within
    /// [`WAKE_WINDOW_MS`](crate::WAKE_WINDOW_MS) of the first one.
    ///
    /// # Arguments
    ///
    /// * `wake_interval_ms` - The interval to set, in milliseconds.
    ///
    /// # Returns
    ///
    /// The updated `Config` instance.
    pub fn wake_interval_ms(mut self, wake_interval_ms: u32) -> Self {
        self.wake_interval_ms = wake_interval_ms;
        self
    }
}

/// Provides default configuration values for the SPS30 sensor.
impl Default for Config {
    /// Returns the default configuration.
    ///
    /// Both timings default to the 30 ms worst-case response time of the sensor.
    fn default() -> Config {
        Config {
            settle_time_ms: SETTLE_TIME_MS,
            wake_interval_ms: SETTLE_TIME_MS,
        }
    }
}

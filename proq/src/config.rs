//! Store configuration.
//!
//! The ring capacity of every series is derived from the display window and
//! the poll interval: one sample per poll, covering both endpoints of the
//! window. Capacity is fixed when the store is built and shared by all series.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Maximum number of samples retained per series.
///
/// Guards against a window/interval ratio that would allocate gigabytes of
/// `f64` slots for every series on first sight.
pub const MAX_CAPACITY: usize = 1_000_000;

/// Default display window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Sizing for a [`Store`](crate::Store).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use proq::config::StoreConfig;
///
/// let config = StoreConfig {
///     window: Duration::from_secs(300),
///     poll_interval: Duration::from_secs(5),
/// };
/// assert_eq!(config.capacity(), 61);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How much history the display shows.
    pub window: Duration,
    /// How often the poll loop scrapes the target.
    pub poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl StoreConfig {
    /// Creates and validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation fails.
    pub fn new(window: Duration, poll_interval: Duration) -> Result<Self> {
        let config = Self {
            window,
            poll_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration whose capacity is exactly `capacity`, using a
    /// one second poll interval.
    ///
    /// A `capacity` of zero yields the same configuration as one; callers
    /// that must reject zero check it first.
    pub fn with_capacity(capacity: usize) -> Self {
        let window_secs = u64::try_from(capacity.saturating_sub(1)).unwrap_or(u64::MAX);
        Self {
            window: Duration::from_secs(window_secs),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Returns `window / poll_interval + 1`, the per-series ring capacity.
    ///
    /// Saturates at `usize::MAX` when the ratio does not fit, and returns 0
    /// for a zero poll interval. Both cases are rejected by
    /// [`validate`](Self::validate).
    pub fn capacity(&self) -> usize {
        self.raw_capacity()
            .map_or(0, |c| usize::try_from(c).unwrap_or(usize::MAX))
    }

    fn raw_capacity(&self) -> Option<u128> {
        let poll = self.poll_interval.as_nanos();
        if poll == 0 {
            return None;
        }
        Some(self.window.as_nanos() / poll + 1)
    }

    /// Validates this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroPollInterval`] for a zero poll interval and
    /// [`ConfigError::CapacityTooLarge`] when the capacity exceeds
    /// [`MAX_CAPACITY`].
    pub fn validate(&self) -> Result<()> {
        let Some(capacity) = self.raw_capacity() else {
            return Err(ConfigError::ZeroPollInterval.into());
        };

        if capacity > MAX_CAPACITY as u128 {
            return Err(ConfigError::CapacityTooLarge {
                window: self.window,
                poll_interval: self.poll_interval,
                capacity,
                max_capacity: MAX_CAPACITY,
            }
            .into());
        }

        Ok(())
    }
}

//! Nanosecond time model shared by the pipeline crates.

use std::time::{Duration, Instant};

/// Monotonic time point or span in nanoseconds.
pub type Nanos = i64;

/// Nanoseconds per second.
pub const NANOS_PER_SECOND: Nanos = 1_000_000_000;

/// Converts a duration to nanoseconds, saturating at `Nanos::MAX`.
pub fn duration_to_nanos(duration: Duration) -> Nanos {
    Nanos::try_from(duration.as_nanos()).unwrap_or(Nanos::MAX)
}

/// Duration of `samples` interleaved samples at the given stream layout.
///
/// A sample count that is not a multiple of the channel count is rounded
/// down to whole audio frames.
pub fn samples_to_nanos(samples: usize, sample_rate: u32, channels: u16) -> Nanos {
    let channels = channels.max(1) as u128;
    let sample_rate = sample_rate.max(1) as u128;
    let frames = samples as u128 / channels;
    let nanos = frames * NANOS_PER_SECOND as u128 / sample_rate;
    Nanos::try_from(nanos).unwrap_or(Nanos::MAX)
}

/// Number of interleaved samples spanning `nanos`, rounded down to whole
/// audio frames.
pub fn nanos_to_samples(nanos: Nanos, sample_rate: u32, channels: u16) -> usize {
    if nanos <= 0 {
        return 0;
    }
    let frames = nanos as u128 * sample_rate.max(1) as u128 / NANOS_PER_SECOND as u128;
    let samples = frames * channels.max(1) as u128;
    usize::try_from(samples).unwrap_or(usize::MAX)
}

/// Source of monotonic timestamps.
///
/// Implementations must be cheap and callable from any thread; the pipeline
/// reads the clock both inside and outside its internal locks.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic time in nanoseconds.
    fn now_ns(&self) -> Nanos;
}

/// Default clock over [`std::time::Instant`], with the epoch at construction.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> Nanos {
        duration_to_nanos(self.epoch.elapsed())
    }
}

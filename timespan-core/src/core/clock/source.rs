use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// A source of monotonic elapsed time readings.
///
/// Readings are only meaningful relative to each other, the origin of a source is arbitrary.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait TimeSource: Debug + Send + Sync {
    /// Returns the elapsed nanoseconds since the origin of this source.
    fn elapsed_nanos(&self) -> u64;
}

/// The production time source, backed by the monotonic [Instant] clock of the system.
#[derive(Debug)]
pub struct MonotonicTimeSource {
    origin: Instant,
}

impl MonotonicTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// A time source which only moves when told to.
///
/// It's used to replay deterministic intervals, e.g. when importing recorded measurements or within tests.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicU64,
}

impl ManualTimeSource {
    /// Create a new manual time source which starts at the given nanoseconds reading.
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Set the current reading of this source.
    /// The reading is allowed to move backwards.
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the current reading forward by the given duration.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(nanos))
            });
    }
}

impl TimeSource for ManualTimeSource {
    fn elapsed_nanos(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

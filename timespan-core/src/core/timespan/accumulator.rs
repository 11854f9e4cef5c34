use log::trace;

use crate::core::timespan;
use crate::core::timespan::TimespanError;

/// The in-flight timer state of a single timespan measurement.
///
/// The accumulator is a plain value owned by whoever measures; it never touches storage.
/// Every successful [TimespanAccumulator::stop_and_sum] hands out the elapsed delta which
/// should be added to the running total of the metric.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TimespanAccumulator {
    start_nanos: Option<u64>,
}

impl TimespanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when a measurement is in-flight.
    pub fn is_running(&self) -> bool {
        self.start_nanos.is_some()
    }

    /// Returns the reading at which the in-flight measurement started, if any.
    pub fn start_nanos(&self) -> Option<u64> {
        self.start_nanos
    }

    /// Start a new measurement at the given reading.
    ///
    /// Starting an already running accumulator is a usage error,
    /// in which case the original start reading is preserved.
    pub fn start(&mut self, now_nanos: u64) -> timespan::Result<()> {
        if self.start_nanos.is_some() {
            return Err(TimespanError::AlreadyRunning);
        }

        trace!("Starting timespan measurement at {}", now_nanos);
        self.start_nanos = Some(now_nanos);
        Ok(())
    }

    /// Stop the in-flight measurement at the given reading.
    ///
    /// The accumulator is idle afterwards, even when the interval is rejected.
    ///
    /// It returns the elapsed nanoseconds of the measurement, else the [TimespanError].
    pub fn stop_and_sum(&mut self, now_nanos: u64) -> timespan::Result<u64> {
        let start_nanos = self.start_nanos.take().ok_or(TimespanError::NotRunning)?;

        now_nanos
            .checked_sub(start_nanos)
            .map(|elapsed| {
                trace!(
                    "Stopped timespan measurement at {}, elapsed {}ns",
                    now_nanos,
                    elapsed
                );
                elapsed
            })
            .ok_or(TimespanError::InvalidInterval(start_nanos, now_nanos))
    }

    /// Discard the in-flight measurement, if any.
    pub fn cancel(&mut self) {
        if let Some(start_nanos) = self.start_nanos.take() {
            trace!("Cancelled timespan measurement started at {}", start_nanos);
        }
    }
}

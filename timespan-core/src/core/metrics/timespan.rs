use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::core::clock::Clock;
use crate::core::metrics;
use crate::core::metrics::{CommonMetricData, ErrorType, MetricError};
use crate::core::storage::TimespanStorageEngine;
use crate::core::timespan::{TimeUnit, TimespanAccumulator, TimespanError, TimespanValue};

/// A timespan metric, measuring the total elapsed time of one or more start/stop intervals.
///
/// Each instance owns its own timer. Usage errors are logged and counted per [ErrorType],
/// they never alter the stored total.
#[derive(Debug)]
pub struct TimespanMetric {
    meta: CommonMetricData,
    time_unit: TimeUnit,
    engine: Arc<TimespanStorageEngine>,
    clock: Arc<Clock>,
    timer: Mutex<TimespanAccumulator>,
    errors: Mutex<HashMap<ErrorType, u32>>,
}

impl TimespanMetric {
    pub fn new(
        meta: CommonMetricData,
        time_unit: TimeUnit,
        engine: Arc<TimespanStorageEngine>,
        clock: Arc<Clock>,
    ) -> Self {
        Self {
            meta,
            time_unit,
            engine,
            clock,
            timer: Mutex::new(TimespanAccumulator::new()),
            errors: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the metadata of this metric.
    pub fn meta(&self) -> &CommonMetricData {
        &self.meta
    }

    /// Returns the declared unit of this metric.
    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// Start tracking time for this metric.
    ///
    /// Starting an already running metric is recorded as [ErrorType::InvalidState],
    /// the original start time is kept.
    pub fn start(&self) {
        if !self.meta.should_record() {
            return;
        }

        let now = self.clock.now_nanos();
        let result = self.timer.lock().start(now);
        if let Err(e) = result {
            self.record_error(e.into());
        }
    }

    /// Stop tracking time and add the elapsed time to the stored total.
    ///
    /// Stopping a metric which isn't running is recorded as [ErrorType::InvalidState],
    /// a clock which went backwards as [ErrorType::InvalidValue].
    pub fn stop(&self) {
        if !self.meta.should_record() {
            self.timer.lock().cancel();
            return;
        }

        let now = self.clock.now_nanos();
        let result = self.timer.lock().stop_and_sum(now);
        match result {
            Ok(elapsed) => self.accumulate(elapsed),
            Err(e) => self.record_error(e.into()),
        }
    }

    /// Abort the in-flight measurement, if any.
    pub fn cancel(&self) {
        self.timer.lock().cancel();
    }

    /// Explicitly add the given elapsed time to the stored total, without using the timer.
    ///
    /// This is rejected as [ErrorType::InvalidState] while the timer is running.
    pub fn set_raw(&self, elapsed: Duration) {
        if !self.meta.should_record() {
            return;
        }

        if self.timer.lock().is_running() {
            self.record_error(TimespanError::RunningConflict.into());
            return;
        }

        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.accumulate(nanos);
    }

    /// Retrieve the stored total of this metric within the given store, or the first store
    /// of the metric when none is given.
    ///
    /// This doesn't clear the stored value.
    pub fn test_get_value<'a, S: Into<Option<&'a str>>>(&self, store: S) -> Option<TimespanValue> {
        let store = match store.into() {
            Some(store) => store,
            None => self.meta.send_in_pings.first()?.as_str(),
        };

        self.engine.value_of(&self.meta, store)
    }

    /// Returns the amount of recorded errors of the given type.
    pub fn error_count(&self, error_type: ErrorType) -> u32 {
        self.errors.lock().get(&error_type).copied().unwrap_or(0)
    }

    fn accumulate(&self, elapsed_nanos: u64) {
        if let Err(e) = self
            .engine
            .accumulate(&self.meta, self.time_unit, elapsed_nanos)
        {
            self.record_error(e.into());
        }
    }

    fn record_error(&self, error: MetricError) {
        let error_type = match &error {
            MetricError::Timespan(e) => ErrorType::from(e),
            MetricError::Storage(_) | MetricError::UnknownLifetime(_) => ErrorType::InvalidState,
        };

        warn!("Timespan {} failed to record, {}", self.meta.identifier(), error);
        let mut errors = self.errors.lock();
        let count = errors.entry(error_type).or_insert(0);
        *count += 1;
        debug!(
            "Timespan {} has recorded {} {:?} errors",
            self.meta.identifier(),
            count,
            error_type
        );
    }
}

/// Measure the given operation with a timespan of the metric.
///
/// It returns the result of the operation.
pub fn measure<T, F: FnOnce() -> T>(metric: &TimespanMetric, operation: F) -> T {
    metric.start();
    let result = operation();
    metric.stop();
    result
}

/// Parse the given lifetime and time unit names into their values.
pub fn parse_declaration(lifetime: &str, time_unit: &str) -> metrics::Result<(metrics::Lifetime, TimeUnit)> {
    let lifetime = lifetime.parse::<metrics::Lifetime>()?;
    let time_unit = time_unit.parse::<TimeUnit>()?;
    Ok((lifetime, time_unit))
}

use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::core::clock::{MonotonicTimeSource, TimeSource};

/// The clock hands out elapsed nanosecond readings from its current [TimeSource].
///
/// The source can be replaced at runtime, e.g. to switch to a deterministic source,
/// without rebuilding the components which hold the clock.
#[derive(Debug)]
pub struct Clock {
    source: RwLock<Arc<dyn TimeSource>>,
}

impl Clock {
    /// Create a new clock which reads from the given source.
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self {
            source: RwLock::new(source),
        }
    }

    /// Returns the current reading of the active source in nanoseconds.
    pub fn now_nanos(&self) -> u64 {
        self.source.read().elapsed_nanos()
    }

    /// Replace the active time source.
    ///
    /// It returns the previously active source.
    pub fn replace(&self, source: Arc<dyn TimeSource>) -> Arc<dyn TimeSource> {
        let mut active = self.source.write();
        debug!("Replacing clock time source {:?} with {:?}", *active, source);
        std::mem::replace(&mut *active, source)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(Arc::new(MonotonicTimeSource::new()))
    }
}
